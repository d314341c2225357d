use serde::{Deserialize, Serialize};

use borrowdesk_core::{DomainError, ValueObject};

/// A strictly positive number of units.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(units: u32) -> Result<Self, DomainError> {
        if units == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        Ok(Self(units))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<u32> for Quantity {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stock level derived from the available/total ratio.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Available,
    LowStock,
    OutOfStock,
}

/// Below this share of total units an item is reported as low stock.
const LOW_STOCK_PERCENT: u64 = 30;

impl StockStatus {
    /// `OutOfStock` at 0 available (or 0 total), `LowStock` under 30%.
    pub fn derive(available: u32, total: u32) -> Self {
        if available == 0 || total == 0 {
            return StockStatus::OutOfStock;
        }
        if u64::from(available) * 100 < u64::from(total) * LOW_STOCK_PERCENT {
            StockStatus::LowStock
        } else {
            StockStatus::Available
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::Available => "available",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}
