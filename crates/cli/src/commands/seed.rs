//! Seed stores and products from a YAML catalog.
//!
//! ```yaml
//! owner: ada
//! currency: NGN
//! stores:
//!   - name: Ada's Kitchen
//!     city: Lagos
//!     state: Lagos
//!     country: NG
//!     products:
//!       - title: Suya spice
//!         price: "2500.00"
//!         stock: 40
//!         weight_kg: "0.2"
//! ```
//!
//! Stores whose slug already exists are skipped with their products, so a
//! catalog can be re-run after a partial failure.

use std::path::Path;

use agora_core::validation::{self, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use agora_core::{Currency, Money, UserRole};
use agora_web::backend::{Access, BackendError, NewProduct, NewStore};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::backend_from_env;

/// A catalog file.
#[derive(Debug, Deserialize)]
pub struct Catalog {
    /// Username that will own every store.
    pub owner: String,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    pub stores: Vec<StoreEntry>,
}

const fn default_currency() -> Currency {
    Currency::NGN
}

#[derive(Debug, Deserialize)]
pub struct StoreEntry {
    pub name: String,
    pub description: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    #[serde(default)]
    pub ships_internationally: bool,
    #[serde(default)]
    pub products: Vec<ProductEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ProductEntry {
    pub title: String,
    pub description: Option<String>,
    pub price: String,
    pub stock: Option<u32>,
    pub weight_kg: Option<Decimal>,
    #[serde(default)]
    pub digital: bool,
}

/// What a seeding run did.
#[derive(Debug, Default)]
pub struct SeedResult {
    pub stores_created: usize,
    pub stores_skipped: usize,
    pub products_created: usize,
}

/// Every problem in `catalog`, so all of them can be fixed in one pass.
#[must_use]
pub fn validate_catalog(catalog: &Catalog) -> Vec<String> {
    let mut errors = Vec::new();
    if catalog.owner.trim().trim_start_matches('@').is_empty() {
        errors.push("owner is empty".to_string());
    }
    if catalog.stores.is_empty() {
        errors.push("no stores listed".to_string());
    }

    for store in &catalog.stores {
        let name = store.name.trim();
        if let Err(e) = validation::required("name", name, MAX_NAME_LENGTH) {
            errors.push(format!("store {name:?}: {e}"));
        }
        if validation::slugify(name).is_err() {
            errors.push(format!("store {name:?}: name has no usable characters"));
        }
        if let Err(e) =
            validation::optional("description", store.description.as_deref(), MAX_DESCRIPTION_LENGTH)
        {
            errors.push(format!("store {name:?}: {e}"));
        }
        if store.city.trim().is_empty() || store.state.trim().is_empty() {
            errors.push(format!("store {name:?}: city and state are required"));
        }
        let country = store.country.trim();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(format!("store {name:?}: country must be a two-letter code"));
        }

        for product in &store.products {
            let title = product.title.trim();
            if let Err(e) = validation::required("title", title, MAX_NAME_LENGTH) {
                errors.push(format!("{name:?} product {title:?}: {e}"));
            }
            match Money::parse(&product.price, catalog.currency) {
                Ok(price) if price.is_positive() => {}
                Ok(_) => errors.push(format!("{name:?} product {title:?}: price must be positive")),
                Err(e) => errors.push(format!("{name:?} product {title:?}: {e}")),
            }
            if product.weight_kg.is_some_and(|w| w < Decimal::ZERO) {
                errors.push(format!("{name:?} product {title:?}: weight cannot be negative"));
            }
        }
    }
    errors
}

/// Seed the catalog in `file_path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, the owner does not
/// exist, or the backend rejects a write.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate before touching the backend
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: Catalog = serde_yaml::from_str(&content)?;

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    info!(stores = catalog.stores.len(), "Catalog validated successfully");

    let backend = backend_from_env()?;
    let handle = catalog.owner.trim().trim_start_matches('@').to_ascii_lowercase();
    let owner = match backend.profile_by_username(&handle).await {
        Ok(profile) => profile,
        Err(BackendError::NotFound(_)) => return Err(format!("No user with username: @{handle}").into()),
        Err(e) => return Err(e.into()),
    };
    if owner.role == UserRole::Member {
        backend.set_role(owner.id, UserRole::Seller).await?;
        info!("Promoted @{} to seller", owner.username);
    }

    let mut result = SeedResult::default();
    for entry in &catalog.stores {
        let slug = validation::slugify(&entry.name)?;
        match backend.store_by_slug(&slug).await {
            Ok(_) => {
                warn!("Store {slug} already exists, skipping");
                result.stores_skipped += 1;
                continue;
            }
            Err(BackendError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let store = backend
            .create_store(
                &NewStore {
                    owner_id: owner.id,
                    slug,
                    name: entry.name.trim().to_string(),
                    description: entry.description.clone(),
                    city: entry.city.trim().to_string(),
                    state: entry.state.trim().to_string(),
                    country: entry.country.trim().to_ascii_uppercase(),
                    ships_internationally: entry.ships_internationally,
                    currency: catalog.currency,
                },
                Access::Service,
            )
            .await?;
        result.stores_created += 1;
        info!("Created store {} (/stores/{})", store.name, store.slug);

        for product in &entry.products {
            let price = Money::parse(&product.price, catalog.currency)?;
            backend
                .create_product(
                    &NewProduct {
                        store_id: store.id,
                        title: product.title.trim().to_string(),
                        description: product.description.clone(),
                        price: price.amount,
                        currency: price.currency,
                        stock: product.stock,
                        weight_kg: product.weight_kg,
                        requires_shipping: !product.digital,
                        image_url: None,
                    },
                    Access::Service,
                )
                .await?;
            result.products_created += 1;
        }
    }

    info!("Seeding complete!");
    info!("  Stores created: {}", result.stores_created);
    info!("  Stores skipped (already exist): {}", result.stores_skipped);
    info!("  Products created: {}", result.products_created);
    Ok(())
}
