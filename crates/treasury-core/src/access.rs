use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{TreasuryError, TreasuryResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    TreasuryManager,
    ShiftManager,
    Manager,
    Employee,
}

impl Role {
    pub fn parse(value: &str) -> TreasuryResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "TREASURY_MANAGER" | "TREASURYMANAGER" => Ok(Self::TreasuryManager),
            "SHIFT_MANAGER" | "SHIFTMANAGER" => Ok(Self::ShiftManager),
            "MANAGER" => Ok(Self::Manager),
            "EMPLOYEE" => Ok(Self::Employee),
            other => Err(TreasuryError::validation(format!("unknown role {other}"))),
        }
    }

    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;

        match self {
            Role::Admin | Role::TreasuryManager | Role::ShiftManager => &[
                OpenShift,
                CloseShift,
                RecordInvoice,
                RequestTransfer,
                DecideTransfer,
                ManageDebts,
                ManageOrders,
                ReconcileFunds,
            ],
            Role::Manager => &[
                OpenShift,
                CloseShift,
                RecordInvoice,
                RequestTransfer,
                ManageDebts,
                ManageOrders,
            ],
            Role::Employee => &[
                OpenShift,
                CloseShift,
                RecordInvoice,
                RequestTransfer,
                ManageOrders,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    OpenShift,
    CloseShift,
    RecordInvoice,
    RequestTransfer,
    DecideTransfer,
    ManageDebts,
    ManageOrders,
    ReconcileFunds,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Capability::OpenShift => "open shifts",
            Capability::CloseShift => "close shifts",
            Capability::RecordInvoice => "record invoices",
            Capability::RequestTransfer => "request transfers",
            Capability::DecideTransfer => "confirm or reject transfers",
            Capability::ManageDebts => "manage debts",
            Capability::ManageOrders => "manage orders",
            Capability::ReconcileFunds => "reconcile funds",
        };
        f.write_str(action)
    }
}

/// A resolved staff member acting on the treasury.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.roles
            .iter()
            .any(|role| role.capabilities().contains(&capability))
    }

    pub fn require(&self, capability: Capability) -> TreasuryResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(TreasuryError::Forbidden {
                actor: self.id.clone(),
                capability,
            })
        }
    }
}

/// Staff registry parsed from `id:ROLE|ROLE,id:ROLE`.
#[derive(Debug, Clone, Default)]
pub struct StaffDirectory {
    staff: HashMap<String, Actor>,
}

impl StaffDirectory {
    pub fn parse(raw: &str) -> TreasuryResult<Self> {
        let mut staff = HashMap::new();

        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (id, roles) = entry.split_once(':').ok_or_else(|| {
                TreasuryError::validation(format!("staff entry {entry} must look like id:ROLE"))
            })?;
            let id = id.trim();
            if id.is_empty() {
                return Err(TreasuryError::validation("staff id is required"));
            }

            let roles = roles
                .split('|')
                .map(Role::parse)
                .collect::<TreasuryResult<Vec<_>>>()?;
            staff.insert(id.to_string(), Actor::new(id, roles));
        }

        Ok(Self { staff })
    }

    pub fn insert(&mut self, actor: Actor) {
        self.staff.insert(actor.id.clone(), actor);
    }

    pub fn resolve(&self, id: &str) -> TreasuryResult<Actor> {
        self.staff
            .get(id.trim())
            .cloned()
            .ok_or_else(|| TreasuryError::UnknownActor(id.trim().to_string()))
    }

    pub fn len(&self) -> usize {
        self.staff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staff.is_empty()
    }
}
