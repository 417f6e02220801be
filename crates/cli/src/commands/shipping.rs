//! Offline shipping quotes.
//!
//! Prices a cart with the same rules checkout uses, without the backend.
//! Rates come from `SHIPPING_*` overrides (see the web config) on top of
//! the naira defaults.
//!
//! ```yaml
//! destination:
//!   full_name: Tunde Bakare
//!   phone: "+2348012345678"
//!   line1: 3 Allen Avenue
//!   city: Ikeja
//!   state: Lagos
//!   country: NG
//! stores:
//!   - name: Ada's Kitchen
//!     city: Lagos
//!     state: Lagos
//!     country: NG
//!     items:
//!       - title: Suya spice
//!         price: "2500"
//!         quantity: 2
//!         weight_kg: "0.2"
//! ```

use std::collections::HashMap;
use std::path::Path;

use agora_core::cart::{CartLine, CartSummary};
use agora_core::shipping::{self, Origin, RateTable, ShippingAddress, ShippingQuote};
use agora_core::{CartItemId, Currency, Money, ProductId, StoreId};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

/// A quote file.
#[derive(Debug, Deserialize)]
pub struct QuoteFile {
    pub destination: ShippingAddress,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    pub stores: Vec<QuoteStore>,
}

const fn default_currency() -> Currency {
    Currency::NGN
}

#[derive(Debug, Deserialize)]
pub struct QuoteStore {
    pub name: String,
    pub city: String,
    pub state: String,
    pub country: String,
    #[serde(default)]
    pub ships_internationally: bool,
    pub items: Vec<QuoteItem>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteItem {
    pub title: String,
    pub price: String,
    #[serde(default = "one")]
    pub quantity: u32,
    pub weight_kg: Option<Decimal>,
    #[serde(default)]
    pub digital: bool,
}

const fn one() -> u32 {
    1
}

/// Turn the file into a cart summary plus store origins.
///
/// # Errors
///
/// Returns an error for unparseable prices or an invalid cart.
pub fn build_cart(
    file: &QuoteFile,
) -> Result<(CartSummary, HashMap<StoreId, Origin>), Box<dyn std::error::Error>> {
    let mut lines = Vec::new();
    let mut origins = HashMap::new();

    for store in &file.stores {
        let store_id = StoreId::generate();
        origins.insert(
            store_id,
            Origin {
                store_name: store.name.clone(),
                city: store.city.clone(),
                state: store.state.clone(),
                country: store.country.clone(),
                ships_internationally: store.ships_internationally,
            },
        );
        for item in &store.items {
            lines.push(CartLine {
                item_id: CartItemId::generate(),
                product_id: ProductId::generate(),
                store_id,
                store_name: store.name.clone(),
                title: item.title.clone(),
                unit_price: Money::parse(&item.price, file.currency)?,
                quantity: item.quantity,
                weight_kg: item.weight_kg,
                requires_shipping: !item.digital,
                stock: None,
            });
        }
    }

    let summary = CartSummary::build(lines, file.currency)?;
    Ok((summary, origins))
}

/// Quote `file` against `rates`.
///
/// # Errors
///
/// Returns cart or shipping errors (incomplete address, undeliverable
/// parcel, currency mismatch).
pub fn quote_file(
    file: &QuoteFile,
    rates: &RateTable,
) -> Result<(CartSummary, ShippingQuote), Box<dyn std::error::Error>> {
    let (summary, origins) = build_cart(file)?;
    let quote = shipping::quote(&summary, &origins, &file.destination, rates)?;
    Ok((summary, quote))
}

/// Print a quote for the file at `file_path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or the cart cannot be quoted.
pub async fn quote(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }
    let content = tokio::fs::read_to_string(path).await?;
    let file: QuoteFile = serde_yaml::from_str(&content)?;

    let rates = agora_web::config::shipping_from_env(file.currency)?;
    let (summary, quote) = quote_file(&file, &rates)?;

    info!("Shipping to {}", file.destination.one_line());
    for parcel in &quote.parcels {
        info!(
            "  {}: {} ({} kg) {}",
            parcel.store_name,
            parcel.zone.label(),
            parcel.weight_kg,
            parcel.fee
        );
    }
    info!("Items:    {}", summary.subtotal);
    info!("Shipping: {}", quote.total);
    info!("Total:    {}", quote.grand_total(summary.subtotal)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_core::shipping::Zone;

    fn file(yaml: &str) -> QuoteFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    const TWO_STORES: &str = r#"
destination:
  full_name: Tunde Bakare
  phone: "+2348012345678"
  line1: 3 Allen Avenue
  city: Ikeja
  state: Lagos
  country: NG
stores:
  - name: Ada's Kitchen
    city: Ikeja
    state: Lagos
    country: NG
    items:
      - title: Suya spice
        price: "2500"
        quantity: 2
        weight_kg: "0.2"
  - name: Abuja Prints
    city: Abuja
    state: FCT
    country: NG
    items:
      - title: Poster
        price: "4000"
        weight_kg: "2.5"
"#;

    #[test]
    fn test_quotes_each_store_by_zone() {
        let (summary, quote) = quote_file(&file(TWO_STORES), &RateTable::default_ngn()).unwrap();
        assert_eq!(summary.subtotal, Money::new(Decimal::from(9_000), Currency::NGN));
        assert_eq!(quote.parcels.len(), 2);

        let kitchen = quote.parcels.iter().find(|p| p.store_name == "Ada's Kitchen").unwrap();
        assert_eq!(kitchen.zone, Zone::SameCity);
        assert_eq!(kitchen.fee, Money::new(Decimal::from(1_500), Currency::NGN));

        // 2.5 kg: base covers 1 kg, the remaining 1.5 kg rounds up to 2
        let prints = quote.parcels.iter().find(|p| p.store_name == "Abuja Prints").unwrap();
        assert_eq!(prints.zone, Zone::Domestic);
        assert_eq!(prints.fee, Money::new(Decimal::from(5_000), Currency::NGN));

        assert_eq!(quote.total, Money::new(Decimal::from(6_500), Currency::NGN));
    }

    #[test]
    fn test_domestic_only_store_cannot_ship_abroad() {
        let yaml = TWO_STORES.replace("  country: NG\nstores:", "  country: GH\nstores:");
        assert!(quote_file(&file(&yaml), &RateTable::default_ngn()).is_err());
    }

    #[test]
    fn test_digital_items_ship_free() {
        let yaml = r#"
destination:
  full_name: Tunde Bakare
  phone: "+2348012345678"
  line1: 3 Allen Avenue
  city: Accra
  state: Greater Accra
  country: GH
stores:
  - name: Ebooks
    city: Lagos
    state: Lagos
    country: NG
    items:
      - title: Cookbook
        price: "1500"
        digital: true
"#;
        let (_, quote) = quote_file(&file(yaml), &RateTable::default_ngn()).unwrap();
        assert!(quote.total.amount.is_zero());
    }
}
