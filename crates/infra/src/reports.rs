//! Inventory dashboard report.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_catalog::{Product, ProductCategory, ProductId, StockStatus, Warehouse};
use wms_ledger::StockKey;

use crate::store::StockPosition;

/// A product at or below its reorder threshold, summed over warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockLine {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub on_hand: i64,
    pub reorder_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: ProductCategory,
    pub products: u64,
    pub on_hand: i64,
    /// On-hand valued at purchase price.
    pub value: u64,
    pub low_stock: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub generated_at: DateTime<Utc>,
    pub products: u64,
    pub active_products: u64,
    pub warehouses: u64,
    pub active_warehouses: u64,
    pub total_on_hand: i64,
    pub total_held: i64,
    pub total_available: i64,
    /// On-hand valued at purchase price, smallest currency unit.
    pub total_value: u64,
    /// Active products only, lowest on-hand first.
    pub low_stock: Vec<LowStockLine>,
    /// One row per category that has products, in category order.
    pub categories: Vec<CategorySummary>,
}

impl InventoryReport {
    /// Assemble the report from catalog rows, key positions and held
    /// quantities per key.
    pub fn build(
        generated_at: DateTime<Utc>,
        products: &[Product],
        warehouses: &[Warehouse],
        positions: &[StockPosition],
        held: &HashMap<StockKey, i64>,
    ) -> Self {
        let mut on_hand_by_product: HashMap<ProductId, i64> = HashMap::new();
        for position in positions {
            *on_hand_by_product
                .entry(position.key.product_id)
                .or_default() += position.on_hand;
        }
        let total_on_hand: i64 = positions.iter().map(|p| p.on_hand).sum();
        let total_held: i64 = held.values().sum();

        let mut total_value = 0u64;
        let mut low_stock = Vec::new();
        let mut categories: BTreeMap<ProductCategory, CategorySummary> = BTreeMap::new();
        for product in products {
            let on_hand = on_hand_by_product
                .get(&product.id_typed())
                .copied()
                .unwrap_or(0);
            let is_low = product.is_active() && product.stock_status(on_hand) == StockStatus::Low;

            let summary = categories
                .entry(product.category())
                .or_insert_with(|| CategorySummary {
                    category: product.category(),
                    products: 0,
                    on_hand: 0,
                    value: 0,
                    low_stock: 0,
                });
            let value = product.inventory_value(on_hand);
            summary.products += 1;
            summary.on_hand += on_hand;
            summary.value = summary.value.saturating_add(value);
            total_value = total_value.saturating_add(value);

            if is_low {
                summary.low_stock += 1;
                low_stock.push(LowStockLine {
                    product_id: product.id_typed(),
                    sku: product.sku().to_string(),
                    name: product.name().to_string(),
                    on_hand,
                    reorder_threshold: product.reorder_threshold(),
                });
            }
        }
        low_stock.sort_by(|a, b| a.on_hand.cmp(&b.on_hand).then_with(|| a.sku.cmp(&b.sku)));

        Self {
            generated_at,
            products: products.len() as u64,
            active_products: products.iter().filter(|p| p.is_active()).count() as u64,
            warehouses: warehouses.len() as u64,
            active_warehouses: warehouses.iter().filter(|w| w.is_active()).count() as u64,
            total_on_hand,
            total_held,
            total_available: total_on_hand - total_held,
            total_value,
            low_stock,
            categories: categories.into_values().collect(),
        }
    }
}
