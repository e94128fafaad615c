//! # Command Protocol
//!
//! One JSON object per line in, one JSON object per line out.
//!
//! ```text
//! → {"id": 1, "command": "create_cart", "userId": "ana@example.com"}
//! ← {"id": 1, "ok": true, "data": {"id": "…", "lines": [], "version": 1, …}}
//!
//! → {"id": 2, "command": "add_line", "cartId": "…", "productId": "…", "quantity": 2}
//! → {"id": 3, "command": "purchase", "cartId": "…", "purchaser": "ana@example.com"}
//! → {"id": 4, "command": "create_product", "token": "…", "product": {…}}
//! → {"id": 5, "command": "list_products", "search": "mate", "sort": "asc"}
//! ```
//!
//! `id` is optional and echoed back unchanged. Catalog writes need the
//! `token` configured as `STOREFRONT_ADMIN_TOKEN`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use storefront_core::{CartLine, CartOwner, CoreError, NewProduct, ProductQuery, ProductUpdate};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// A parsed input line.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(flatten)]
    pub command: Command,
}

/// Everything a caller can ask for.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "command",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    // Carts
    CreateCart {
        user_id: Option<String>,
        #[serde(default)]
        lines: Vec<CartLine>,
    },
    GetCart {
        cart_id: String,
    },
    CartView {
        cart_id: String,
    },
    ListCarts,
    AddLine {
        cart_id: String,
        product_id: String,
        quantity: i64,
    },
    SetLineQuantity {
        cart_id: String,
        product_id: String,
        quantity: i64,
    },
    RemoveLine {
        cart_id: String,
        product_id: String,
    },
    ReplaceLines {
        cart_id: String,
        lines: Vec<CartLine>,
    },
    ClearCart {
        cart_id: String,
    },
    DeleteCart {
        cart_id: String,
    },

    // Checkout and tickets
    Purchase {
        cart_id: String,
        purchaser: String,
    },
    GetTicket {
        code: String,
    },
    ListTickets {
        purchaser: String,
    },

    // Catalog
    CreateProduct {
        token: Option<String>,
        product: NewProduct,
    },
    UpdateProduct {
        token: Option<String>,
        product_id: String,
        update: ProductUpdate,
    },
    DeleteProduct {
        token: Option<String>,
        product_id: String,
    },
    GetProduct {
        product_id: String,
    },
    ListProducts(ProductQuery),

    Health,
}

impl Command {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateCart { .. } => "create_cart",
            Command::GetCart { .. } => "get_cart",
            Command::CartView { .. } => "cart_view",
            Command::ListCarts => "list_carts",
            Command::AddLine { .. } => "add_line",
            Command::SetLineQuantity { .. } => "set_line_quantity",
            Command::RemoveLine { .. } => "remove_line",
            Command::ReplaceLines { .. } => "replace_lines",
            Command::ClearCart { .. } => "clear_cart",
            Command::DeleteCart { .. } => "delete_cart",
            Command::Purchase { .. } => "purchase",
            Command::GetTicket { .. } => "get_ticket",
            Command::ListTickets { .. } => "list_tickets",
            Command::CreateProduct { .. } => "create_product",
            Command::UpdateProduct { .. } => "update_product",
            Command::DeleteProduct { .. } => "delete_product",
            Command::GetProduct { .. } => "get_product",
            Command::ListProducts(_) => "list_products",
            Command::Health => "health",
        }
    }
}

/// One output line answering a request.
#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl Response {
    /// A failure reply to a line that could not be read as a request.
    pub fn rejected(error: ApiError) -> Self {
        Response::reply(None, Err(error))
    }

    fn reply(id: Option<Value>, result: Result<Value, ApiError>) -> Self {
        match result {
            Ok(data) => Response {
                id,
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(error) => Response {
                id,
                ok: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

/// Parses and runs one input line.
pub async fn handle_line(state: &AppState, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            // Salvage the id so the caller can still correlate the failure.
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").cloned());
            return Response::reply(id, Err(e.into()));
        }
    };

    let name = request.command.name();
    debug!(command = name, "Dispatching command");

    let result = dispatch(state, request.command).await;
    if let Err(e) = &result {
        debug!(command = name, code = ?e.code, "Command failed");
    }

    Response::reply(request.id, result)
}

/// Runs a command against the engines.
pub async fn dispatch(state: &AppState, command: Command) -> Result<Value, ApiError> {
    match command {
        Command::CreateCart { user_id, lines } => {
            to_data(state.carts.create_cart(CartOwner::from_user(user_id), lines).await?)
        }
        Command::GetCart { cart_id } => to_data(state.carts.get_cart(&cart_id).await?),
        Command::CartView { cart_id } => to_data(state.carts.cart_view(&cart_id).await?),
        Command::ListCarts => to_data(state.carts.list_carts().await?),
        Command::AddLine {
            cart_id,
            product_id,
            quantity,
        } => to_data(state.carts.add_line(&cart_id, &product_id, quantity).await?),
        Command::SetLineQuantity {
            cart_id,
            product_id,
            quantity,
        } => to_data(
            state
                .carts
                .set_line_quantity(&cart_id, &product_id, quantity)
                .await?,
        ),
        Command::RemoveLine {
            cart_id,
            product_id,
        } => to_data(state.carts.remove_line(&cart_id, &product_id).await?),
        Command::ReplaceLines { cart_id, lines } => {
            to_data(state.carts.replace_all_lines(&cart_id, lines).await?)
        }
        Command::ClearCart { cart_id } => to_data(state.carts.clear_cart(&cart_id).await?),
        Command::DeleteCart { cart_id } => {
            state.carts.delete_cart(&cart_id).await?;
            Ok(serde_json::json!({ "deleted": cart_id }))
        }

        Command::Purchase { cart_id, purchaser } => {
            to_data(state.checkout.purchase(&cart_id, &purchaser).await?)
        }
        Command::GetTicket { code } => match state.tickets.get_by_code(&code).await? {
            Some(ticket) => to_data(ticket),
            None => Err(CoreError::TicketNotFound(code).into()),
        },
        Command::ListTickets { purchaser } => {
            to_data(state.tickets.list_for_purchaser(&purchaser).await?)
        }

        Command::CreateProduct { token, product } => {
            let is_admin = state.is_admin(token.as_deref());
            to_data(state.catalog.create_product(is_admin, product).await?)
        }
        Command::UpdateProduct {
            token,
            product_id,
            update,
        } => {
            let is_admin = state.is_admin(token.as_deref());
            to_data(
                state
                    .catalog
                    .update_product(is_admin, &product_id, update)
                    .await?,
            )
        }
        Command::DeleteProduct { token, product_id } => {
            let is_admin = state.is_admin(token.as_deref());
            state.catalog.delete_product(is_admin, &product_id).await?;
            Ok(serde_json::json!({ "deleted": product_id }))
        }
        Command::GetProduct { product_id } => {
            to_data(state.catalog.get_product(&product_id).await?)
        }
        Command::ListProducts(query) => to_data(state.catalog.list_products(query).await?),

        Command::Health => Ok(serde_json::json!({
            "database": state.db.health_check().await,
            "feedSubscribers": state.events.subscriber_count(),
        })),
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let request: Request = serde_json::from_str(
            r#"{"id": 3, "command": "add_line", "cartId": "c-1", "productId": "p-1", "quantity": 2}"#,
        )
        .unwrap();
        assert_eq!(request.id, Some(Value::from(3)));
        assert!(matches!(
            request.command,
            Command::AddLine { ref cart_id, quantity: 2, .. } if cart_id == "c-1"
        ));

        let request: Request =
            serde_json::from_str(r#"{"command": "create_cart"}"#).unwrap();
        assert!(matches!(
            request.command,
            Command::CreateCart { user_id: None, ref lines } if lines.is_empty()
        ));

        let request: Request = serde_json::from_str(
            r#"{"command": "list_products", "search": "mate", "sort": "desc", "limit": 5}"#,
        )
        .unwrap();
        match request.command {
            Command::ListProducts(query) => {
                assert_eq!(query.search.as_deref(), Some("mate"));
                assert_eq!(query.limit, 5);
                assert_eq!(query.page, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let request: Request = serde_json::from_str(r#"{"command": "list_carts"}"#).unwrap();
        assert_eq!(request.command.name(), "list_carts");
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"command": "refund"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"cartId": "c-1"}"#).is_err());
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::reply(
            Some(Value::from("a")),
            Ok(serde_json::json!({"x": 1})),
        ))
        .unwrap();
        assert_eq!(ok, serde_json::json!({"id": "a", "ok": true, "data": {"x": 1}}));

        let err = serde_json::to_value(Response::reply(None, Err(ApiError::bad_request("nope"))))
            .unwrap();
        assert_eq!(err["ok"], false);
        assert_eq!(err["error"]["code"], "BAD_REQUEST");
        assert!(err.get("id").is_none());
    }
}
