use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use wms_catalog::{
    DisableProduct, DisableWarehouse, EnableProduct, EnableWarehouse, Location, Pricing, Product,
    ProductCategory, ProductCommand, ProductId, RegisterProduct, RegisterWarehouse, RenameProduct,
    SetPricing, SetReorderThreshold, UnitOfMeasure, Warehouse, WarehouseCommand, WarehouseId,
    generate_sku,
};
use wms_core::{Aggregate, AggregateId, AggregateRoot, ExpectedVersion};
use wms_events::EventBus;

use crate::error::EngineResult;
use crate::publisher::{
    JsonEnvelope, PRODUCT_AGGREGATE, WAREHOUSE_AGGREGATE, product_stream, warehouse_stream,
};
use crate::retry::retry_on_conflict;
use crate::services::EngineContext;
use crate::store::WarehouseStore;

/// Product registration request. A blank or missing SKU is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    pub category: ProductCategory,
    pub unit: UnitOfMeasure,
    #[serde(default)]
    pub reorder_threshold: u32,
    #[serde(default)]
    pub pricing: Pricing,
}

/// Product listing filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive substring of the name or SKU.
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<ProductCategory>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        let text = self
            .q
            .as_deref()
            .is_none_or(|q| product.matches_text(q.trim()));
        let category = self.category.is_none_or(|c| product.category() == c);
        text && category
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub code: String,
    pub name: String,
    pub location: Location,
}

/// Catalog administration: products and warehouses.
#[derive(Debug)]
pub struct CatalogService<S, B> {
    ctx: EngineContext<S, B>,
}

impl<S, B> Clone for CatalogService<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S, B> CatalogService<S, B>
where
    S: WarehouseStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(ctx: EngineContext<S, B>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub async fn register_product(&self, request: NewProduct) -> EngineResult<Product> {
        let product_id = ProductId::new(AggregateId::new());
        let sku = request
            .sku
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| generate_sku(request.category, Uuid::now_v7()));

        let mut product = Product::empty(product_id);
        let events = product.execute(&ProductCommand::RegisterProduct(RegisterProduct {
            product_id,
            sku,
            name: request.name,
            category: request.category,
            unit: request.unit,
            reorder_threshold: request.reorder_threshold,
            pricing: request.pricing,
            occurred_at: self.ctx.now(),
        }))?;

        self.ctx
            .store
            .save_product(&product, ExpectedVersion::Exact(0))
            .await?;
        self.ctx
            .publisher
            .publish(&product_stream(product_id), PRODUCT_AGGREGATE, 1, &events);

        info!(product_id = %product_id, sku = product.sku(), "product registered");
        Ok(product)
    }

    pub async fn product(&self, id: ProductId) -> EngineResult<Product> {
        self.ctx.require_product(id).await
    }

    /// Products matching `filter`, in store order.
    pub async fn search_products(&self, filter: &ProductFilter) -> EngineResult<Vec<Product>> {
        let mut products = self.ctx.store.list_products().await?;
        products.retain(|p| filter.matches(p));
        Ok(products)
    }

    pub async fn rename_product(&self, id: ProductId, name: &str) -> EngineResult<Product> {
        self.update_product(id, "rename_product", |occurred_at| {
            ProductCommand::RenameProduct(RenameProduct {
                product_id: id,
                name: name.to_string(),
                occurred_at,
            })
        })
        .await
    }

    pub async fn set_reorder_threshold(
        &self,
        id: ProductId,
        reorder_threshold: u32,
    ) -> EngineResult<Product> {
        self.update_product(id, "set_reorder_threshold", |occurred_at| {
            ProductCommand::SetReorderThreshold(SetReorderThreshold {
                product_id: id,
                reorder_threshold,
                occurred_at,
            })
        })
        .await
    }

    pub async fn set_pricing(&self, id: ProductId, pricing: Pricing) -> EngineResult<Product> {
        self.update_product(id, "set_pricing", |occurred_at| {
            ProductCommand::SetPricing(SetPricing {
                product_id: id,
                pricing,
                occurred_at,
            })
        })
        .await
    }

    pub async fn disable_product(&self, id: ProductId) -> EngineResult<Product> {
        self.update_product(id, "disable_product", |occurred_at| {
            ProductCommand::DisableProduct(DisableProduct {
                product_id: id,
                occurred_at,
            })
        })
        .await
    }

    pub async fn enable_product(&self, id: ProductId) -> EngineResult<Product> {
        self.update_product(id, "enable_product", |occurred_at| {
            ProductCommand::EnableProduct(EnableProduct {
                product_id: id,
                occurred_at,
            })
        })
        .await
    }

    #[instrument(skip(self, request), fields(code = %request.code), err)]
    pub async fn register_warehouse(&self, request: NewWarehouse) -> EngineResult<Warehouse> {
        let warehouse_id = WarehouseId::new(AggregateId::new());

        let mut warehouse = Warehouse::empty(warehouse_id);
        let events = warehouse.execute(&WarehouseCommand::RegisterWarehouse(RegisterWarehouse {
            warehouse_id,
            code: request.code,
            name: request.name,
            location: request.location,
            occurred_at: self.ctx.now(),
        }))?;

        self.ctx
            .store
            .save_warehouse(&warehouse, ExpectedVersion::Exact(0))
            .await?;
        self.ctx.publisher.publish(
            &warehouse_stream(warehouse_id),
            WAREHOUSE_AGGREGATE,
            1,
            &events,
        );

        info!(warehouse_id = %warehouse_id, code = warehouse.code(), "warehouse registered");
        Ok(warehouse)
    }

    pub async fn warehouse(&self, id: WarehouseId) -> EngineResult<Warehouse> {
        self.ctx.require_warehouse(id).await
    }

    pub async fn warehouses(&self) -> EngineResult<Vec<Warehouse>> {
        Ok(self.ctx.store.list_warehouses().await?)
    }

    pub async fn disable_warehouse(&self, id: WarehouseId) -> EngineResult<Warehouse> {
        self.update_warehouse(id, "disable_warehouse", |occurred_at| {
            WarehouseCommand::DisableWarehouse(DisableWarehouse {
                warehouse_id: id,
                occurred_at,
            })
        })
        .await
    }

    pub async fn enable_warehouse(&self, id: WarehouseId) -> EngineResult<Warehouse> {
        self.update_warehouse(id, "enable_warehouse", |occurred_at| {
            WarehouseCommand::EnableWarehouse(EnableWarehouse {
                warehouse_id: id,
                occurred_at,
            })
        })
        .await
    }

    async fn update_product<F>(
        &self,
        id: ProductId,
        operation: &'static str,
        command: F,
    ) -> EngineResult<Product>
    where
        F: Fn(DateTime<Utc>) -> ProductCommand,
    {
        let command = &command;
        retry_on_conflict(&self.ctx.retry, operation, || async move {
            let mut product = self.ctx.require_product(id).await?;
            let loaded = product.version();
            let events = product.execute(&command(self.ctx.now()))?;
            if events.is_empty() {
                return Ok(product);
            }

            self.ctx
                .store
                .save_product(&product, ExpectedVersion::Exact(loaded))
                .await?;
            self.ctx
                .publisher
                .publish(&product_stream(id), PRODUCT_AGGREGATE, loaded + 1, &events);
            info!(product_id = %id, operation, "product updated");
            Ok(product)
        })
        .await
    }

    async fn update_warehouse<F>(
        &self,
        id: WarehouseId,
        operation: &'static str,
        command: F,
    ) -> EngineResult<Warehouse>
    where
        F: Fn(DateTime<Utc>) -> WarehouseCommand,
    {
        let command = &command;
        retry_on_conflict(&self.ctx.retry, operation, || async move {
            let mut warehouse = self.ctx.require_warehouse(id).await?;
            let loaded = warehouse.version();
            let events = warehouse.execute(&command(self.ctx.now()))?;
            if events.is_empty() {
                return Ok(warehouse);
            }

            self.ctx
                .store
                .save_warehouse(&warehouse, ExpectedVersion::Exact(loaded))
                .await?;
            self.ctx.publisher.publish(
                &warehouse_stream(id),
                WAREHOUSE_AGGREGATE,
                loaded + 1,
                &events,
            );
            info!(warehouse_id = %id, operation, "warehouse updated");
            Ok(warehouse)
        })
        .await
    }
}
