//! Storefronts and products.

use agora_core::validation::{self, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use agora_core::{Money, ProductId, UserRole};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use super::{MultipartForm, PageContext, flash_or_fail, redirect_with_success};
use crate::backend::{Access, BackendError, NewProduct, NewStore};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, MediaKind, Product, Store};
use crate::services::MediaService;
use crate::services::media::{self, MediaError};
use crate::state::AppState;

/// Open store form data.
#[derive(Debug, Deserialize)]
pub struct CreateStoreForm {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub city: String,
    pub state: String,
    pub country: String,
    /// Checkbox: present only when ticked.
    pub ships_internationally: Option<String>,
}

fn not_found(what: &'static str) -> impl FnOnce(BackendError) -> AppError {
    move |e| match e {
        BackendError::NotFound(_) => AppError::NotFound(what.to_string()),
        other => other.into(),
    }
}

/// Stores index template.
#[derive(Template, WebTemplate)]
#[template(path = "stores/index.html")]
pub struct StoresTemplate {
    pub ctx: PageContext,
    pub stores: Vec<Store>,
}

/// List stores.
pub async fn index(State(state): State<AppState>, ctx: PageContext) -> Result<impl IntoResponse> {
    let stores = state.backend().list_stores().await?;
    Ok(StoresTemplate { ctx, stores })
}

/// Open a store. The owner's account becomes a seller account.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<CreateStoreForm>,
) -> Response {
    match open_store(&state, &user, &form).await {
        Ok(store) => {
            redirect_with_success(&session, &format!("/stores/{}", store.slug), "Store opened")
                .await
        }
        Err(e) => flash_or_fail(&session, e, "/stores").await,
    }
}

async fn open_store(state: &AppState, user: &CurrentUser, form: &CreateStoreForm) -> Result<Store> {
    let name = validation::required("store name", &form.name, MAX_NAME_LENGTH)?;
    let description = validation::optional(
        "description",
        Some(form.description.as_str()),
        MAX_DESCRIPTION_LENGTH,
    )?;
    let city = validation::required("city", &form.city, MAX_NAME_LENGTH)?;
    let region = validation::required("state", &form.state, MAX_NAME_LENGTH)?;
    let country = validation::required("country", &form.country, 2)?.to_ascii_uppercase();

    let store = NewStore {
        owner_id: user.id,
        slug: validation::slugify(name)?,
        name: name.to_string(),
        description: description.map(str::to_string),
        city: city.to_string(),
        state: region.to_string(),
        country,
        ships_internationally: form.ships_internationally.is_some(),
        currency: state.config().currency,
    };

    let backend = state.backend();
    let created = backend
        .create_store(&store, Access::User(&user.access_token))
        .await
        .map_err(|e| match e {
            BackendError::Conflict(_) => {
                AppError::Conflict(format!("A store called \"{name}\" already exists"))
            }
            other => other.into(),
        })?;

    if user.role == UserRole::Member
        && let Err(e) = backend.set_role(user.id, UserRole::Seller).await
    {
        warn!(error = %e, "Failed to mark store owner as seller");
    }
    info!(store = %created.slug, "Store opened");
    Ok(created)
}

/// Storefront template.
#[derive(Template, WebTemplate)]
#[template(path = "stores/show.html")]
pub struct StoreTemplate {
    pub ctx: PageContext,
    pub store: Store,
    pub products: Vec<Product>,
    pub is_owner: bool,
}

/// Display a storefront.
#[instrument(skip(state, ctx))]
pub async fn show(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let backend = state.backend();
    let store = backend
        .store_by_slug(&slug)
        .await
        .map_err(not_found("store"))?;
    let mut products = backend.products_for_store(store.id).await?;
    let is_owner = ctx.user.as_ref().is_some_and(|u| u.id == store.owner_id);
    if !is_owner {
        products.retain(|p| p.active);
    }

    Ok(StoreTemplate {
        ctx,
        store,
        products,
        is_owner,
    })
}

/// Parse the numeric product fields.
fn parse_product_numbers(
    form: &MultipartForm,
    state: &AppState,
) -> Result<(Money, Option<u32>, Option<Decimal>)> {
    let price = Money::parse(form.text("price"), state.config().currency)?;
    if !price.is_positive() {
        return Err(AppError::BadRequest("Price must be more than zero".into()));
    }
    let stock = form
        .non_empty("stock")
        .map(str::parse::<u32>)
        .transpose()
        .map_err(|_| AppError::BadRequest("Stock must be a whole number".into()))?;
    let weight = form
        .non_empty("weight_kg")
        .map(str::parse::<Decimal>)
        .transpose()
        .map_err(|_| AppError::BadRequest("Weight must be a number of kilograms".into()))?;
    if weight.is_some_and(|w| w.is_sign_negative()) {
        return Err(AppError::BadRequest("Weight can't be negative".into()));
    }
    Ok((price, stock, weight))
}

/// Add a product (owner only; multipart with optional `image`).
#[instrument(skip(state, session, user, multipart), fields(user_id = %user.id))]
pub async fn add_product(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(slug): Path<String>,
    multipart: Multipart,
) -> Response {
    let back = format!("/stores/{slug}");
    match create_product(&state, &user, &slug, multipart).await {
        Ok(product) => {
            redirect_with_success(&session, &back, &format!("Added \"{}\"", product.title)).await
        }
        Err(e) => flash_or_fail(&session, e, &back).await,
    }
}

async fn create_product(
    state: &AppState,
    user: &CurrentUser,
    slug: &str,
    multipart: Multipart,
) -> Result<Product> {
    let backend = state.backend();
    let store = backend
        .store_by_slug(slug)
        .await
        .map_err(not_found("store"))?;
    if store.owner_id != user.id {
        return Err(AppError::Forbidden(
            "Only the store owner can add products".into(),
        ));
    }

    let mut form = MultipartForm::read(multipart, "image").await?;
    let file = form.take_file();
    let title = validation::required("title", form.text("title"), MAX_NAME_LENGTH)?.to_string();
    let description =
        validation::optional("description", form.non_empty("description"), MAX_DESCRIPTION_LENGTH)?
            .map(str::to_string);
    let (price, stock, weight_kg) = parse_product_numbers(&form, state)?;
    let access = Access::User(&user.access_token);

    let image_url = match file {
        Some(file) => {
            if media::accept(&file.content_type)?.kind != MediaKind::Image {
                return Err(MediaError::UnsupportedType(file.content_type).into());
            }
            let uploaded = MediaService::new(backend)
                .upload(user.id, &file.content_type, file.bytes, access)
                .await?;
            Some(uploaded.url)
        }
        None => None,
    };

    let product = NewProduct {
        store_id: store.id,
        title,
        description,
        price: price.amount,
        currency: price.currency,
        stock,
        weight_kg,
        // "digital" checkbox ticked means nothing to ship
        requires_shipping: form.non_empty("digital").is_none(),
        image_url,
    };
    Ok(backend.create_product(&product, access).await?)
}

/// Product page template.
#[derive(Template, WebTemplate)]
#[template(path = "stores/product.html")]
pub struct ProductTemplate {
    pub ctx: PageContext,
    pub product: Product,
}

/// Display a product.
pub async fn product(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(id): Path<ProductId>,
) -> Result<impl IntoResponse> {
    let product = state
        .backend()
        .product_by_id(id)
        .await
        .map_err(not_found("product"))?;
    if !product.active {
        return Err(AppError::NotFound("product".into()));
    }
    Ok(ProductTemplate { ctx, product })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::backend::tests::client_for;
    use crate::config::tests::test_config;
    use crate::payments::Gateways;
    use crate::routes::tests::multipart;
    use agora_core::{Email, StoreId, UserId};
    use serde_json::json;

    fn state() -> AppState {
        AppState::from_parts(
            test_config(),
            client_for("http://127.0.0.1:9"),
            Gateways::default(),
        )
    }

    fn form(fields: &[(&str, &str)]) -> MultipartForm {
        MultipartForm {
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            file: None,
        }
    }

    #[test]
    fn test_product_numbers_parse() {
        let (price, stock, weight) = parse_product_numbers(
            &form(&[("price", "4500"), ("stock", "12"), ("weight_kg", "0.75")]),
            &state(),
        )
        .unwrap();
        assert_eq!(price.amount, Decimal::new(450_000, 2));
        assert_eq!(stock, Some(12));
        assert_eq!(weight, Some(Decimal::new(75, 2)));
    }

    #[test]
    fn test_product_numbers_optional_fields() {
        let (_, stock, weight) =
            parse_product_numbers(&form(&[("price", "10"), ("stock", " ")]), &state()).unwrap();
        assert_eq!(stock, None);
        assert_eq!(weight, None);
    }

    #[test]
    fn test_product_numbers_reject_bad_input() {
        assert!(parse_product_numbers(&form(&[("price", "0")]), &state()).is_err());
        assert!(parse_product_numbers(&form(&[("price", "abc")]), &state()).is_err());
        assert!(
            parse_product_numbers(&form(&[("price", "10"), ("stock", "-1")]), &state()).is_err()
        );
        assert!(
            parse_product_numbers(&form(&[("price", "10"), ("weight_kg", "-2")]), &state())
                .is_err()
        );
    }

    async fn shop(owner: UserId) -> AppState {
        let fake = FakeBackend::new();
        fake.seed(
            "stores",
            [json!({
                "id": StoreId::generate(), "owner_id": owner, "slug": "adire-house",
                "name": "Adire House", "city": "Lagos", "state": "Lagos", "country": "NG"
            })],
        );
        AppState::from_parts(test_config(), fake.start().await, Gateways::default())
    }

    fn seller(id: UserId) -> CurrentUser {
        CurrentUser {
            id,
            email: Email::parse("tola@example.com").unwrap(),
            username: "tola".to_string(),
            role: UserRole::Seller,
            access_token: "seller-jwt".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX,
        }
    }

    #[tokio::test]
    async fn test_owner_adds_digital_product() {
        let owner = UserId::generate();
        let state = shop(owner).await;
        let parts = multipart(&[
            ("title", None, "Pattern pack"),
            ("price", None, "2500"),
            ("digital", None, "on"),
            ("image", Some("image/png"), ""),
        ])
        .await;

        let product = create_product(&state, &seller(owner), "adire-house", parts)
            .await
            .unwrap();
        assert_eq!(product.title, "Pattern pack");
        assert_eq!(product.price, Decimal::from(2_500));
        assert!(!product.requires_shipping);
        assert!(product.image_url.is_none());
    }

    #[tokio::test]
    async fn test_only_owner_adds_products() {
        let state = shop(UserId::generate()).await;
        let parts = multipart(&[("title", None, "Pattern pack"), ("price", None, "2500")]).await;
        let result = create_product(&state, &seller(UserId::generate()), "adire-house", parts).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
