//! Cart, shipping, payment routing and ledger rules working together, the
//! way checkout strings them along.

use std::collections::HashMap;

use agora_core::cart::{CartError, CartLine, CartSummary, DEFAULT_WEIGHT_KG};
use agora_core::payments::{self, Gateway, PaymentMethod, PaymentPurpose, PaymentReference, Route};
use agora_core::shipping::{self, Origin, RateTable, ShippingAddress, Zone};
use agora_core::wallet::{self, LedgerError};
use agora_core::{CartItemId, Currency, Money, ProductId, StoreId, TransactionKind};
use rust_decimal::Decimal;

fn ngn(amount: i64) -> Money {
    Money::new(Decimal::from(amount), Currency::NGN)
}

fn line(store_id: StoreId, store: &str, price: Money, quantity: u32, weight: Option<&str>) -> CartLine {
    CartLine {
        item_id: CartItemId::generate(),
        product_id: ProductId::generate(),
        store_id,
        store_name: store.to_string(),
        title: format!("{store} item"),
        unit_price: price,
        quantity,
        weight_kg: weight.map(|w| w.parse().unwrap_or_default()),
        requires_shipping: true,
        stock: None,
    }
}

fn origin(name: &str, city: &str, state: &str) -> Origin {
    Origin {
        store_name: name.to_string(),
        city: city.to_string(),
        state: state.to_string(),
        country: "NG".to_string(),
        ships_internationally: false,
    }
}

fn lagos_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Tunde Bakare".to_string(),
        phone: "+2348012345678".to_string(),
        line1: "3 Allen Avenue".to_string(),
        line2: None,
        city: "Ikeja".to_string(),
        state: "Lagos".to_string(),
        country: "NG".to_string(),
        postal_code: None,
    }
}

#[test]
fn test_two_store_cart_quotes_one_parcel_per_store() {
    let kitchen = StoreId::generate();
    let prints = StoreId::generate();
    let lines = vec![
        line(kitchen, "Kitchen", ngn(2_500), 2, Some("0.2")),
        line(prints, "Prints", ngn(4_000), 1, None),
        line(kitchen, "Kitchen", ngn(1_000), 1, Some("0.1")),
    ];
    let summary = CartSummary::build(lines, Currency::NGN).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(summary.parcels.len(), 2);
    assert_eq!(summary.item_count, 4);
    assert_eq!(summary.subtotal, ngn(10_000));

    // Unknown weight falls back to the default
    let prints_parcel = summary.parcels.iter().find(|p| p.store_id == prints);
    assert_eq!(prints_parcel.map(|p| p.weight_kg), Some(DEFAULT_WEIGHT_KG));

    let origins = HashMap::from([
        (kitchen, origin("Kitchen", "Ikeja", "Lagos")),
        (prints, origin("Prints", "Abuja", "FCT")),
    ]);
    let quote = shipping::quote(&summary, &origins, &lagos_address(), &RateTable::default_ngn())
        .unwrap_or_else(|e| panic!("{e}"));

    let zones: HashMap<StoreId, Zone> = quote.parcels.iter().map(|p| (p.store_id, p.zone)).collect();
    assert_eq!(zones.get(&kitchen), Some(&Zone::SameCity));
    assert_eq!(zones.get(&prints), Some(&Zone::Domestic));
    assert_eq!(quote.total, ngn(1_500 + 4_000));
    assert_eq!(quote.grand_total(summary.subtotal).ok(), Some(ngn(15_500)));
}

#[test]
fn test_mixed_currency_cart_is_rejected() {
    let store = StoreId::generate();
    let lines = vec![
        line(store, "Kitchen", ngn(1_000), 1, None),
        line(store, "Kitchen", Money::new(Decimal::from(10), Currency::GHS), 1, None),
    ];
    assert_eq!(CartSummary::build(lines, Currency::NGN), Err(CartError::MixedCurrency));
}

#[test]
fn test_payment_routing_preferences() {
    let both = [Gateway::Paystack, Gateway::Flutterwave];
    assert_eq!(
        payments::route(PaymentMethod::Card, Currency::NGN, &both).ok(),
        Some(Route::Gateway(Gateway::Paystack))
    );
    assert_eq!(
        payments::route(PaymentMethod::Card, Currency::KES, &both).ok(),
        Some(Route::Gateway(Gateway::Flutterwave))
    );
    assert_eq!(
        payments::route(PaymentMethod::Wallet, Currency::NGN, &[]).ok(),
        Some(Route::Wallet)
    );
    // Only one gateway configured: it takes the card payment
    assert_eq!(
        payments::route(PaymentMethod::Card, Currency::NGN, &[Gateway::Flutterwave]).ok(),
        Some(Route::Gateway(Gateway::Flutterwave))
    );
    assert!(payments::route(PaymentMethod::Card, Currency::NGN, &[]).is_err());
}

#[test]
fn test_references_round_trip_through_text() {
    let reference = PaymentReference::generate(PaymentPurpose::Order);
    let text = reference.to_string();
    assert!(text.starts_with("AGR-ORD-"));
    let parsed: PaymentReference = text.parse().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(parsed.purpose(), PaymentPurpose::Order);
}

#[test]
fn test_wallet_checkout_cannot_overdraw() {
    let balance = ngn(5_000);
    let total = ngn(5_500);
    assert!(matches!(
        wallet::apply(balance, TransactionKind::Purchase, total),
        Err(LedgerError::InsufficientFunds { .. })
    ));
    assert_eq!(
        wallet::apply(balance, TransactionKind::Purchase, ngn(5_000)).ok(),
        Some(ngn(0))
    );
}
