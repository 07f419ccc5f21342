use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wms_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use wms_events::Event;

use crate::code::normalize_code;

const SKU_MAX_LEN: usize = 32;
const NAME_MIN_CHARS: usize = 2;

/// Quantities above `threshold` but within this multiple of it are a warning.
pub const WARNING_MULTIPLIER: i64 = 5;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Merchandise category, used for SKU prefixes and report summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Electronics,
    Clothing,
    Food,
    Books,
    Furniture,
    Sports,
    Beauty,
    General,
}

impl ProductCategory {
    /// Three-letter prefix used for generated SKUs.
    pub fn code(self) -> &'static str {
        match self {
            ProductCategory::Electronics => "ELE",
            ProductCategory::Clothing => "CLO",
            ProductCategory::Food => "FOO",
            ProductCategory::Books => "BOO",
            ProductCategory::Furniture => "FUR",
            ProductCategory::Sports => "SPO",
            ProductCategory::Beauty => "BEA",
            ProductCategory::General => "GEN",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProductCategory::Electronics => "electronics",
            ProductCategory::Clothing => "clothing",
            ProductCategory::Food => "food",
            ProductCategory::Books => "books",
            ProductCategory::Furniture => "furniture",
            ProductCategory::Sports => "sports",
            ProductCategory::Beauty => "beauty",
            ProductCategory::General => "general",
        }
    }
}

/// Unit a product is counted in. Ledger quantities are whole units of this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Each,
    Pack,
    Case,
    Pallet,
    Kilogram,
    Litre,
    Metre,
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Disabled,
}

/// Stock level classification against a product's reorder threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Low,
    Warning,
    InStock,
}

/// Unit prices in the smallest currency unit (e.g. cents).
///
/// Zero means "not priced yet". When both are set, selling may not be below
/// purchase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub purchase_price: u64,
    pub selling_price: u64,
}

impl Pricing {
    pub fn new(purchase_price: u64, selling_price: u64) -> Self {
        Self {
            purchase_price,
            selling_price,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let (purchase, selling) = (self.purchase_price, self.selling_price);
        if purchase > 0 && selling > 0 && selling < purchase {
            return Err(DomainError::validation(
                "selling price cannot be less than purchase price",
            ));
        }
        Ok(())
    }

    /// Markup over purchase price in percent, two decimals. `None` while unpriced.
    pub fn margin_percent(&self) -> Option<f64> {
        if self.purchase_price == 0 || self.selling_price == 0 {
            return None;
        }
        let profit = self.selling_price as f64 - self.purchase_price as f64;
        Some((profit / self.purchase_price as f64 * 10_000.0).round() / 100.0)
    }
}

/// Build a SKU of the form `ELE-3F9A0C` from a category and a random seed.
///
/// The suffix is taken from the trailing (random) bytes of the seed so that
/// time-ordered UUIDs still produce well-spread SKUs.
pub fn generate_sku(category: ProductCategory, seed: Uuid) -> String {
    let bytes = seed.as_bytes();
    format!(
        "{}-{:02X}{:02X}{:02X}",
        category.code(),
        bytes[13],
        bytes[14],
        bytes[15]
    )
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    category: ProductCategory,
    unit: UnitOfMeasure,
    reorder_threshold: u32,
    #[serde(default)]
    pricing: Pricing,
    status: ProductStatus,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            sku: String::new(),
            name: String::new(),
            category: ProductCategory::General,
            unit: UnitOfMeasure::Each,
            reorder_threshold: 0,
            pricing: Pricing::default(),
            status: ProductStatus::Active,
            registered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ProductCategory {
        self.category
    }

    pub fn unit(&self) -> UnitOfMeasure {
        self.unit
    }

    pub fn reorder_threshold(&self) -> u32 {
        self.reorder_threshold
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    /// Only active products can take new reservations or orders.
    pub fn is_active(&self) -> bool {
        self.created && self.status == ProductStatus::Active
    }

    /// Stock value at purchase price. Negative quantities count as zero.
    pub fn inventory_value(&self, on_hand: i64) -> u64 {
        self.pricing
            .purchase_price
            .saturating_mul(u64::try_from(on_hand).unwrap_or(0))
    }

    /// Case-insensitive substring match on name or SKU.
    pub fn matches_text(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.name.to_lowercase().contains(&query)
            || self.sku.to_lowercase().contains(&query)
    }

    pub fn is_low_stock(&self, on_hand: i64) -> bool {
        on_hand <= i64::from(self.reorder_threshold)
    }

    pub fn stock_status(&self, on_hand: i64) -> StockStatus {
        let threshold = i64::from(self.reorder_threshold);
        if on_hand <= threshold {
            StockStatus::Low
        } else if on_hand <= threshold * WARNING_MULTIPLIER {
            StockStatus::Warning
        } else {
            StockStatus::InStock
        }
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: ProductCategory,
    pub unit: UnitOfMeasure,
    pub reorder_threshold: u32,
    #[serde(default)]
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameProduct {
    pub product_id: ProductId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetReorderThreshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReorderThreshold {
    pub product_id: ProductId,
    pub reorder_threshold: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPricing {
    pub product_id: ProductId,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DisableProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EnableProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    RegisterProduct(RegisterProduct),
    RenameProduct(RenameProduct),
    SetReorderThreshold(SetReorderThreshold),
    SetPricing(SetPricing),
    DisableProduct(DisableProduct),
    EnableProduct(EnableProduct),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: ProductCategory,
    pub unit: UnitOfMeasure,
    pub reorder_threshold: u32,
    #[serde(default)]
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRenamed {
    pub product_id: ProductId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReorderThresholdChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderThresholdChanged {
    pub product_id: ProductId,
    pub previous: u32,
    pub reorder_threshold: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PricingChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingChanged {
    pub product_id: ProductId,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDisabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDisabled {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductEnabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEnabled {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    ProductRenamed(ProductRenamed),
    ReorderThresholdChanged(ReorderThresholdChanged),
    PricingChanged(PricingChanged),
    ProductDisabled(ProductDisabled),
    ProductEnabled(ProductEnabled),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "catalog.product.registered",
            ProductEvent::ProductRenamed(_) => "catalog.product.renamed",
            ProductEvent::ReorderThresholdChanged(_) => "catalog.product.threshold_changed",
            ProductEvent::PricingChanged(_) => "catalog.product.pricing_changed",
            ProductEvent::ProductDisabled(_) => "catalog.product.disabled",
            ProductEvent::ProductEnabled(_) => "catalog.product.enabled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::ProductRenamed(e) => e.occurred_at,
            ProductEvent::ReorderThresholdChanged(e) => e.occurred_at,
            ProductEvent::PricingChanged(e) => e.occurred_at,
            ProductEvent::ProductDisabled(e) => e.occurred_at,
            ProductEvent::ProductEnabled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category;
                self.unit = e.unit;
                self.reorder_threshold = e.reorder_threshold;
                self.pricing = e.pricing;
                self.status = ProductStatus::Active;
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductEvent::ProductRenamed(e) => {
                self.name = e.name.clone();
            }
            ProductEvent::ReorderThresholdChanged(e) => {
                self.reorder_threshold = e.reorder_threshold;
            }
            ProductEvent::PricingChanged(e) => {
                self.pricing = e.pricing;
            }
            ProductEvent::ProductDisabled(_) => {
                self.status = ProductStatus::Disabled;
            }
            ProductEvent::ProductEnabled(_) => {
                self.status = ProductStatus::Active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            ProductCommand::RenameProduct(cmd) => self.handle_rename(cmd),
            ProductCommand::SetReorderThreshold(cmd) => self.handle_set_threshold(cmd),
            ProductCommand::SetPricing(cmd) => self.handle_set_pricing(cmd),
            ProductCommand::DisableProduct(cmd) => self.handle_disable(cmd),
            ProductCommand::EnableProduct(cmd) => self.handle_enable(cmd),
        }
    }
}

fn validate_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.chars().count() < NAME_MIN_CHARS {
        return Err(DomainError::validation(format!(
            "product name must be at least {NAME_MIN_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

impl Product {
    fn ensure_exists(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("product {product_id}")));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        let sku = normalize_code("sku", &cmd.sku, SKU_MAX_LEN)?;
        let name = validate_name(&cmd.name)?;
        cmd.pricing.validate()?;

        Ok(vec![ProductEvent::ProductRegistered(ProductRegistered {
            product_id: cmd.product_id,
            sku,
            name,
            category: cmd.category,
            unit: cmd.unit,
            reorder_threshold: cmd.reorder_threshold,
            pricing: cmd.pricing,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        let name = validate_name(&cmd.name)?;
        if name == self.name {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductRenamed(ProductRenamed {
            product_id: cmd.product_id,
            name,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_threshold(
        &self,
        cmd: &SetReorderThreshold,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        if cmd.reorder_threshold == self.reorder_threshold {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ReorderThresholdChanged(
            ReorderThresholdChanged {
                product_id: cmd.product_id,
                previous: self.reorder_threshold,
                reorder_threshold: cmd.reorder_threshold,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_set_pricing(&self, cmd: &SetPricing) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        cmd.pricing.validate()?;
        if cmd.pricing == self.pricing {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::PricingChanged(PricingChanged {
            product_id: cmd.product_id,
            pricing: cmd.pricing,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_disable(&self, cmd: &DisableProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        if self.status == ProductStatus::Disabled {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductDisabled(ProductDisabled {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_enable(&self, cmd: &EnableProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        if self.status == ProductStatus::Active {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductEnabled(ProductEnabled {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(product_id: ProductId) -> RegisterProduct {
        RegisterProduct {
            product_id,
            sku: "ele-0001".to_string(),
            name: "Bench Power Supply".to_string(),
            category: ProductCategory::Electronics,
            unit: UnitOfMeasure::Each,
            reorder_threshold: 10,
            pricing: Pricing::new(4_500, 7_999),
            occurred_at: test_time(),
        }
    }

    fn registered(product_id: ProductId) -> Product {
        let mut product = Product::empty(product_id);
        product
            .execute(&ProductCommand::RegisterProduct(register_cmd(product_id)))
            .unwrap();
        product
    }

    #[test]
    fn register_normalises_sku_and_activates() {
        let product_id = test_product_id();
        let product = registered(product_id);

        assert_eq!(product.sku(), "ELE-0001");
        assert_eq!(product.status(), ProductStatus::Active);
        assert!(product.is_active());
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn register_rejects_short_name() {
        let product_id = test_product_id();
        let mut cmd = register_cmd(product_id);
        cmd.name = " x ".to_string();

        match Product::empty(product_id).handle(&ProductCommand::RegisterProduct(cmd)) {
            Err(DomainError::Validation(msg)) if msg.contains("at least 2") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn register_rejects_duplicate_creation() {
        let product_id = test_product_id();
        let product = registered(product_id);

        match product.handle(&ProductCommand::RegisterProduct(register_cmd(product_id))) {
            Err(DomainError::Conflict(_)) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn rename_requires_existing_product() {
        let product_id = test_product_id();
        let cmd = RenameProduct {
            product_id,
            name: "Lab Supply".to_string(),
            occurred_at: test_time(),
        };

        match Product::empty(product_id).handle(&ProductCommand::RenameProduct(cmd)) {
            Err(DomainError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn rename_to_same_name_is_a_no_op() {
        let product_id = test_product_id();
        let product = registered(product_id);
        let cmd = RenameProduct {
            product_id,
            name: "  Bench Power Supply ".to_string(),
            occurred_at: test_time(),
        };

        let events = product.handle(&ProductCommand::RenameProduct(cmd)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn threshold_change_records_previous_value() {
        let product_id = test_product_id();
        let mut product = registered(product_id);
        let cmd = SetReorderThreshold {
            product_id,
            reorder_threshold: 25,
            occurred_at: test_time(),
        };

        let events = product
            .execute(&ProductCommand::SetReorderThreshold(cmd))
            .unwrap();
        match &events[0] {
            ProductEvent::ReorderThresholdChanged(e) => {
                assert_eq!(e.previous, 10);
                assert_eq!(e.reorder_threshold, 25);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(product.reorder_threshold(), 25);
    }

    #[test]
    fn disable_is_idempotent() {
        let product_id = test_product_id();
        let mut product = registered(product_id);
        let cmd = DisableProduct {
            product_id,
            occurred_at: test_time(),
        };

        let first = product
            .execute(&ProductCommand::DisableProduct(cmd.clone()))
            .unwrap();
        let second = product
            .execute(&ProductCommand::DisableProduct(cmd))
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(!product.is_active());
        assert_eq!(product.version(), 2);
    }

    #[test]
    fn enable_restores_active_status() {
        let product_id = test_product_id();
        let mut product = registered(product_id);
        product
            .execute(&ProductCommand::DisableProduct(DisableProduct {
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        product
            .execute(&ProductCommand::EnableProduct(EnableProduct {
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap();

        assert!(product.is_active());
    }

    #[test]
    fn stock_status_bands_follow_threshold() {
        let product = registered(test_product_id());

        assert_eq!(product.stock_status(0), StockStatus::Low);
        assert_eq!(product.stock_status(10), StockStatus::Low);
        assert_eq!(product.stock_status(11), StockStatus::Warning);
        assert_eq!(product.stock_status(50), StockStatus::Warning);
        assert_eq!(product.stock_status(51), StockStatus::InStock);
        assert!(product.is_low_stock(10));
        assert!(!product.is_low_stock(11));
    }

    #[test]
    fn pricing_is_validated_and_values_stock() {
        let product_id = test_product_id();
        let mut cmd = register_cmd(product_id);
        cmd.pricing = Pricing::new(500, 450);
        match Product::empty(product_id).handle(&ProductCommand::RegisterProduct(cmd)) {
            Err(DomainError::Validation(msg)) if msg.contains("selling price") => {}
            other => panic!("expected Validation, got {other:?}"),
        }

        let mut product = registered(product_id);
        assert_eq!(product.inventory_value(3), 13_500);
        assert_eq!(product.inventory_value(-2), 0);
        assert_eq!(product.pricing().margin_percent(), Some(77.76));

        let set = |pricing| {
            ProductCommand::SetPricing(SetPricing {
                product_id,
                pricing,
                occurred_at: test_time(),
            })
        };
        let events = product.execute(&set(Pricing::new(5_000, 8_000))).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(product.pricing().selling_price, 8_000);
        assert!(product.execute(&set(Pricing::new(5_000, 8_000))).unwrap().is_empty());
        assert!(Pricing::default().margin_percent().is_none());
    }

    #[test]
    fn text_search_covers_name_and_sku() {
        let product = registered(test_product_id());
        assert!(product.matches_text("power"));
        assert!(product.matches_text("ele-00"));
        assert!(product.matches_text("  "));
        assert!(!product.matches_text("kettle"));
    }

    #[test]
    fn generated_sku_uses_category_prefix() {
        let seed = Uuid::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x3f, 0x9a, 0x0c]);
        assert_eq!(generate_sku(ProductCategory::Books, seed), "BOO-3F9A0C");
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let product_id = test_product_id();
        let product = registered(product_id);
        let before = product.clone();

        let cmd = ProductCommand::DisableProduct(DisableProduct {
            product_id,
            occurred_at: test_time(),
        });
        let events1 = product.handle(&cmd).unwrap();
        let events2 = product.handle(&cmd).unwrap();

        assert_eq!(product, before);
        assert_eq!(events1, events2);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: generated SKUs always pass SKU validation.
            #[test]
            fn generated_skus_are_valid(bytes in any::<[u8; 16]>()) {
                let sku = generate_sku(ProductCategory::Sports, Uuid::from_bytes(bytes));
                prop_assert_eq!(normalize_code("sku", &sku, SKU_MAX_LEN).unwrap(), sku);
            }

            /// Property: apply is deterministic and bumps version once per event.
            #[test]
            fn apply_is_deterministic(
                name in "[A-Za-z][A-Za-z0-9 ]{1,40}",
                thresholds in proptest::collection::vec(0u32..1000, 0..10)
            ) {
                let product_id = test_product_id();
                let mut events = vec![ProductEvent::ProductRegistered(ProductRegistered {
                    product_id,
                    sku: "SPO-1".to_string(),
                    name: name.clone(),
                    category: ProductCategory::Sports,
                    unit: UnitOfMeasure::Each,
                    reorder_threshold: 0,
                    pricing: Pricing::default(),
                    occurred_at: test_time(),
                })];
                let mut previous = 0;
                for t in &thresholds {
                    events.push(ProductEvent::ReorderThresholdChanged(ReorderThresholdChanged {
                        product_id,
                        previous,
                        reorder_threshold: *t,
                        occurred_at: test_time(),
                    }));
                    previous = *t;
                }

                let mut a = Product::empty(product_id);
                let mut b = Product::empty(product_id);
                for e in &events {
                    a.apply(e);
                    b.apply(e);
                }

                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.version(), events.len() as u64);
                prop_assert_eq!(a.reorder_threshold(), previous);
            }
        }
    }
}
