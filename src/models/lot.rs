use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AssetDefinition, AssetType, Currency, CurrencyError, Id, Symbol};

/// Rejections raised when a lot is created or edited.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LotError {
    #[error("Quantity must be greater than zero (got {0})")]
    NonPositiveQuantity(Decimal),
    #[error("Purchase price must not be negative (got {0})")]
    NegativePrice(Decimal),
    #[error("Quantity {quantity} has more than {precision} decimal places allowed for {symbol}")]
    ExcessPrecision {
        symbol: Symbol,
        quantity: Decimal,
        precision: u32,
    },
    #[error(transparent)]
    InvalidCurrency(#[from] CurrencyError),
    #[error("Unknown asset symbol {0}")]
    UnknownSymbol(Symbol),
    #[error("Asset {0} is not available for new lots")]
    Unavailable(Symbol),
}

/// One purchase of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: Id,
    pub user_id: Id,
    pub symbol: Symbol,
    pub asset_type: AssetType,
    /// Quantity precision of the asset, joined in from the catalog.
    pub precision: u32,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    pub currency: Currency,
    pub purchase_date: NaiveDate,
    #[serde(default)]
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User input for a new lot, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLot {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    pub currency: String,
    pub purchase_date: NaiveDate,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update of an existing lot. The symbol of a lot never changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotEdit {
    pub quantity: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub currency: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub platform: Option<String>,
    pub notes: Option<Option<String>>,
}

impl Lot {
    /// Validate `input` against the catalog definition and build a lot.
    pub fn create(
        user_id: Id,
        input: NewLot,
        definition: &AssetDefinition,
        now: DateTime<Utc>,
    ) -> Result<Self, LotError> {
        if !definition.available {
            return Err(LotError::Unavailable(definition.symbol.clone()));
        }
        let currency = Currency::parse(&input.currency)?;
        validate_quantity(&definition.symbol, input.quantity, definition.precision)?;
        validate_price(input.purchase_price)?;

        Ok(Self {
            id: Id::new(),
            user_id,
            symbol: definition.symbol.clone(),
            asset_type: definition.asset_type,
            precision: definition.precision,
            quantity: input.quantity,
            purchase_price: input.purchase_price,
            currency,
            purchase_date: input.purchase_date,
            platform: input.platform.trim().to_string(),
            notes: input.notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply an edit; the lot is left untouched when validation fails.
    pub fn apply_edit(&mut self, edit: LotEdit, now: DateTime<Utc>) -> Result<(), LotError> {
        let quantity = edit.quantity.unwrap_or(self.quantity);
        let purchase_price = edit.purchase_price.unwrap_or(self.purchase_price);
        let currency = match edit.currency {
            Some(code) => Currency::parse(&code)?,
            None => self.currency.clone(),
        };
        validate_quantity(&self.symbol, quantity, self.precision)?;
        validate_price(purchase_price)?;

        self.quantity = quantity;
        self.purchase_price = purchase_price;
        self.currency = currency;
        if let Some(date) = edit.purchase_date {
            self.purchase_date = date;
        }
        if let Some(platform) = edit.platform {
            self.platform = platform.trim().to_string();
        }
        if let Some(notes) = edit.notes {
            self.notes = notes.filter(|n| !n.trim().is_empty());
        }
        self.updated_at = now;
        Ok(())
    }

    /// Purchase cost in the lot's own currency.
    pub fn cost(&self) -> Decimal {
        self.quantity * self.purchase_price
    }
}

fn validate_quantity(symbol: &Symbol, quantity: Decimal, precision: u32) -> Result<(), LotError> {
    if quantity <= Decimal::ZERO {
        return Err(LotError::NonPositiveQuantity(quantity));
    }
    if quantity.normalize().scale() > precision {
        return Err(LotError::ExcessPrecision {
            symbol: symbol.clone(),
            quantity,
            precision,
        });
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), LotError> {
    if price < Decimal::ZERO {
        return Err(LotError::NegativePrice(price));
    }
    Ok(())
}
