use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use wms_events::Event;

use crate::code::normalize_code;

const CODE_MAX_LEN: usize = 16;

/// Warehouse identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for WarehouseId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Location metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseStatus {
    Active,
    Disabled,
}

/// Aggregate root: Warehouse. Identity and code never change after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    id: WarehouseId,
    code: String,
    name: String,
    location: Location,
    status: WarehouseStatus,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Warehouse {
    pub fn empty(id: WarehouseId) -> Self {
        Self {
            id,
            code: String::new(),
            name: String::new(),
            location: Location {
                address: String::new(),
                zone: None,
            },
            status: WarehouseStatus::Active,
            registered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> WarehouseId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn status(&self) -> WarehouseStatus {
        self.status
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    pub fn is_active(&self) -> bool {
        self.created && self.status == WarehouseStatus::Active
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWarehouse {
    pub warehouse_id: WarehouseId,
    pub code: String,
    pub name: String,
    pub location: Location,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableWarehouse {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableWarehouse {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseCommand {
    RegisterWarehouse(RegisterWarehouse),
    DisableWarehouse(DisableWarehouse),
    EnableWarehouse(EnableWarehouse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRegistered {
    pub warehouse_id: WarehouseId,
    pub code: String,
    pub name: String,
    pub location: Location,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDisabled {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseEnabled {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    WarehouseRegistered(WarehouseRegistered),
    WarehouseDisabled(WarehouseDisabled),
    WarehouseEnabled(WarehouseEnabled),
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::WarehouseRegistered(_) => "catalog.warehouse.registered",
            WarehouseEvent::WarehouseDisabled(_) => "catalog.warehouse.disabled",
            WarehouseEvent::WarehouseEnabled(_) => "catalog.warehouse.enabled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::WarehouseRegistered(e) => e.occurred_at,
            WarehouseEvent::WarehouseDisabled(e) => e.occurred_at,
            WarehouseEvent::WarehouseEnabled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Warehouse {
    type Command = WarehouseCommand;
    type Event = WarehouseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WarehouseEvent::WarehouseRegistered(e) => {
                self.id = e.warehouse_id;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.location = e.location.clone();
                self.status = WarehouseStatus::Active;
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            WarehouseEvent::WarehouseDisabled(_) => self.status = WarehouseStatus::Disabled,
            WarehouseEvent::WarehouseEnabled(_) => self.status = WarehouseStatus::Active,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WarehouseCommand::RegisterWarehouse(cmd) => self.handle_register(cmd),
            WarehouseCommand::DisableWarehouse(cmd) => {
                self.ensure_exists(cmd.warehouse_id)?;
                if self.status == WarehouseStatus::Disabled {
                    return Ok(vec![]);
                }
                Ok(vec![WarehouseEvent::WarehouseDisabled(WarehouseDisabled {
                    warehouse_id: cmd.warehouse_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WarehouseCommand::EnableWarehouse(cmd) => {
                self.ensure_exists(cmd.warehouse_id)?;
                if self.status == WarehouseStatus::Active {
                    return Ok(vec![]);
                }
                Ok(vec![WarehouseEvent::WarehouseEnabled(WarehouseEnabled {
                    warehouse_id: cmd.warehouse_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Warehouse {
    fn ensure_exists(&self, warehouse_id: WarehouseId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("warehouse {warehouse_id}")));
        }
        if self.id != warehouse_id {
            return Err(DomainError::invariant("warehouse_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(
        &self,
        cmd: &RegisterWarehouse,
    ) -> Result<Vec<WarehouseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("warehouse already exists"));
        }
        let code = normalize_code("warehouse code", &cmd.code, CODE_MAX_LEN)?;
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("warehouse name cannot be empty"));
        }
        let address = cmd.location.address.trim();
        if address.is_empty() {
            return Err(DomainError::validation("warehouse address cannot be empty"));
        }
        let zone = cmd
            .location
            .zone
            .as_deref()
            .map(str::trim)
            .filter(|z| !z.is_empty())
            .map(str::to_string);

        Ok(vec![WarehouseEvent::WarehouseRegistered(WarehouseRegistered {
            warehouse_id: cmd.warehouse_id,
            code,
            name: name.to_string(),
            location: Location {
                address: address.to_string(),
                zone,
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}
