//! # Remote Store
//!
//! Client side of the shop API's cart and wishlist endpoints.
//!
//! ## Endpoint Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    RemoteStore → HTTP                                   │
//! │                                                                         │
//! │  fetch_cart            GET    {base}/cart                               │
//! │  add_to_cart           POST   {base}/cart          {productId,quantity}│
//! │  update_cart_item      PUT    {base}/cart/{id}     {quantity}          │
//! │  remove_from_cart      DELETE {base}/cart/{id}                          │
//! │  clear_cart            DELETE {base}/cart                               │
//! │  fetch_wishlist        GET    {base}/wishlist                           │
//! │  add_to_wishlist       POST   {base}/wishlist      {productId}         │
//! │  remove_from_wishlist  DELETE {base}/wishlist/{id}                      │
//! │                                                                         │
//! │  Every request: Authorization: Bearer <token>                          │
//! │                 X-Request-Id:  <uuid v4>                               │
//! │                                                                         │
//! │  non-2xx │ transport error │ timeout │ bad body  ──►  RemoteFailure    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There are no retries at this layer or above it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use cartsync_core::{CartItem, CartState, Money, ProductRef, WishlistEntry};

use crate::config::RemoteSettings;
use crate::error::{EngineError, EngineResult};

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

// =============================================================================
// Wire Types
// =============================================================================

/// One entry of `GET /cart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCartLine {
    /// Bare id or embedded product with `_id`.
    pub product: ProductRef,
    pub quantity: i64,
    #[serde(default)]
    pub item_total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
}

/// Body of `GET /cart`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    #[serde(default)]
    pub cart: Vec<RemoteCartLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_total: Option<Money>,
}

impl CartResponse {
    /// Converts the payload into a reconciled cart.
    ///
    /// Aggregates are recomputed from the lines. A `cartTotal` that disagrees
    /// is logged and ignored.
    pub fn into_cart_state(self) -> CartState {
        let reported = self.cart_total;
        let state = CartState::from_items(self.cart.into_iter().map(|line| {
            CartItem::from_remote(line.product, line.quantity, line.item_total, line.price)
        }));

        if let Some(reported) = reported {
            if reported != state.total() {
                warn!(
                    reported = %reported,
                    computed = %state.total(),
                    "Server cart total disagrees with line totals, using computed total"
                );
            }
        }

        state
    }
}

/// Body of `GET /wishlist`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WishlistResponse {
    #[serde(default)]
    pub wishlist: Vec<WishlistEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddToCartBody<'a> {
    product_id: &'a str,
    quantity: i64,
}

#[derive(Debug, Serialize)]
struct UpdateQuantityBody {
    quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WishlistBody<'a> {
    product_id: &'a str,
}

// =============================================================================
// Remote Store Trait
// =============================================================================

/// The authoritative cart/wishlist API.
///
/// Every call may fail with `EngineError::RemoteFailure`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_cart(&self) -> EngineResult<CartResponse>;

    async fn fetch_wishlist(&self) -> EngineResult<WishlistResponse>;

    async fn add_to_cart(&self, product_id: &str, quantity: i64) -> EngineResult<()>;

    async fn update_cart_item(&self, product_id: &str, quantity: i64) -> EngineResult<()>;

    async fn remove_from_cart(&self, product_id: &str) -> EngineResult<()>;

    async fn clear_cart(&self) -> EngineResult<()>;

    async fn add_to_wishlist(&self, product_id: &str) -> EngineResult<()>;

    async fn remove_from_wishlist(&self, product_id: &str) -> EngineResult<()>;
}

/// Opens a `RemoteStore` for a bearer token.
///
/// The engine calls this on every switch into authenticated mode.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, token: &str) -> EngineResult<Arc<dyn RemoteStore>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// `RemoteStore` over the shop's JSON API.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for HttpRemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl HttpRemoteStore {
    pub fn new(settings: &RemoteSettings, token: impl Into<String>) -> EngineResult<Self> {
        let base_url = settings.parsed_base_url()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpRemoteStore {
            client,
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends path segments to the base URL. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> EngineResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        Ok(self.client.request(method, url).bearer_auth(&self.token))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> EngineResult<Response> {
        let request_id = Uuid::new_v4();
        debug!(operation, %request_id, "Sending shop API request");

        let response = request
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("timed out: {}", e)
                } else {
                    e.to_string()
                };
                warn!(operation, %request_id, reason = %reason, "Shop API request failed");
                EngineError::remote(operation, reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(operation, %request_id, %status, "Shop API rejected request");
            return Err(EngineError::remote(operation, format!("HTTP {}", status)));
        }

        debug!(operation, %request_id, %status, "Shop API request succeeded");
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> EngineResult<T> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| EngineError::remote(operation, format!("undecodable body: {}", e)))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_cart(&self) -> EngineResult<CartResponse> {
        let request = self.request(Method::GET, &["cart"])?;
        self.send_json("fetch_cart", request).await
    }

    async fn fetch_wishlist(&self) -> EngineResult<WishlistResponse> {
        let request = self.request(Method::GET, &["wishlist"])?;
        self.send_json("fetch_wishlist", request).await
    }

    async fn add_to_cart(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        let request = self
            .request(Method::POST, &["cart"])?
            .json(&AddToCartBody {
                product_id,
                quantity,
            });
        self.send("add_to_cart", request).await.map(|_| ())
    }

    async fn update_cart_item(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        let request = self
            .request(Method::PUT, &["cart", product_id])?
            .json(&UpdateQuantityBody { quantity });
        self.send("update_cart_item", request).await.map(|_| ())
    }

    async fn remove_from_cart(&self, product_id: &str) -> EngineResult<()> {
        let request = self.request(Method::DELETE, &["cart", product_id])?;
        self.send("remove_from_cart", request).await.map(|_| ())
    }

    async fn clear_cart(&self) -> EngineResult<()> {
        let request = self.request(Method::DELETE, &["cart"])?;
        self.send("clear_cart", request).await.map(|_| ())
    }

    async fn add_to_wishlist(&self, product_id: &str) -> EngineResult<()> {
        let request = self
            .request(Method::POST, &["wishlist"])?
            .json(&WishlistBody { product_id });
        self.send("add_to_wishlist", request).await.map(|_| ())
    }

    async fn remove_from_wishlist(&self, product_id: &str) -> EngineResult<()> {
        let request = self.request(Method::DELETE, &["wishlist", product_id])?;
        self.send("remove_from_wishlist", request).await.map(|_| ())
    }
}

/// Connects `HttpRemoteStore`s with fixed settings.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    settings: RemoteSettings,
}

impl HttpConnector {
    pub fn new(settings: RemoteSettings) -> Self {
        HttpConnector { settings }
    }
}

impl RemoteConnector for HttpConnector {
    fn connect(&self, token: &str) -> EngineResult<Arc<dyn RemoteStore>> {
        Ok(Arc::new(HttpRemoteStore::new(&self.settings, token)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_core::ProductSnapshot;
    use serde_json::json;

    fn store(base: &str) -> HttpRemoteStore {
        let settings = RemoteSettings {
            base_url: base.to_string(),
            ..Default::default()
        };
        HttpRemoteStore::new(&settings, "token").unwrap()
    }

    #[test]
    fn test_endpoint_appends_to_base_path() {
        let remote = store("https://shop.example.com/api");
        assert_eq!(
            remote.endpoint(&["cart"]).unwrap().as_str(),
            "https://shop.example.com/api/cart"
        );

        let remote = store("https://shop.example.com/api/");
        assert_eq!(
            remote.endpoint(&["wishlist", "p-1"]).unwrap().as_str(),
            "https://shop.example.com/api/wishlist/p-1"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = RemoteSettings::default();
        let remote = HttpRemoteStore::new(&settings, "super-secret").unwrap();
        let rendered = format!("{:?}", remote);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("localhost:5000"));
    }

    #[test]
    fn test_endpoint_encodes_product_id() {
        let remote = store("https://shop.example.com");
        let url = remote.endpoint(&["cart", "a b%"]).unwrap();
        assert_eq!(url.path(), "/cart/a%20b%25");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let settings = RemoteSettings {
            base_url: "mailto:shop@example.com".to_string(),
            ..Default::default()
        };
        assert!(HttpRemoteStore::new(&settings, "t")
            .unwrap_err()
            .is_config_error());
    }

    #[test]
    fn test_cart_response_decodes_both_product_shapes() {
        let body = json!({
            "cart": [
                { "product": "p-1", "quantity": 2, "itemTotal": 1000 },
                {
                    "product": { "_id": "p-2", "name": "Hat", "price": 1500, "slug": "hat" },
                    "quantity": 1,
                    "itemTotal": 1500
                }
            ],
            "cartTotal": 2500
        });

        let response: CartResponse = serde_json::from_value(body).unwrap();
        let state = response.into_cart_state();

        assert_eq!(state.count(), 2);
        assert_eq!(state.total().cents(), 2500);
        let hat = state.get("p-2").unwrap();
        assert_eq!(hat.unit_price, Some(Money::from_cents(1500)));
        assert_eq!(
            hat.product.as_ref().unwrap().extra.get("slug"),
            Some(&json!("hat"))
        );
    }

    #[test]
    fn test_mismatched_cart_total_is_ignored() {
        let response = CartResponse {
            cart: vec![RemoteCartLine {
                product: ProductRef::from(ProductSnapshot::new("p-1")),
                quantity: 3,
                item_total: Money::from_cents(300),
                price: Some(Money::from_cents(100)),
            }],
            cart_total: Some(Money::from_cents(9999)),
        };

        let state = response.into_cart_state();
        assert_eq!(state.total().cents(), 300);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_wishlist_response_decodes_mixed_entries() {
        let body = json!({ "wishlist": ["p-1", { "_id": "p-2" }] });
        let response: WishlistResponse = serde_json::from_value(body).unwrap();
        let ids: Vec<&str> = response.wishlist.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["p-1", "p-2"]);
    }

    #[test]
    fn test_request_bodies_are_camel_case() {
        let body = serde_json::to_value(AddToCartBody {
            product_id: "p-1",
            quantity: 2,
        })
        .unwrap();
        assert_eq!(body, json!({ "productId": "p-1", "quantity": 2 }));
    }
}
