use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        admin::{LowStockList, UpdateOrderStatusRequest},
        auth::{AuthSession, LoginRequest, MeResponse, RefreshRequest, SignupRequest, TokenPair},
        events::{CreateEventRequest, EventCreated},
        orders::{
            CreateOrderRequest, CreatedOrder, OrderDetail, OrderItemDetail, OrderLineRequest,
            OrderList,
        },
        products::{ProductDetail, ProductList},
    },
    models::{
        Category, Inventory, Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentStatus,
        Product, PublicUser, Review,
    },
    payments::PaymentInit,
    response::{ApiResponse, Meta},
    routes::{admin, auth, events, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        auth::signup,
        auth::login,
        auth::refresh,
        auth::me,
        products::list_products,
        products::get_product,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::verify_payment,
        events::create_event,
        admin::list_all_orders,
        admin::update_order_status,
        admin::list_low_stock
    ),
    components(
        schemas(
            PublicUser,
            Category,
            Inventory,
            Review,
            Product,
            Order,
            OrderItem,
            OrderStatus,
            Payment,
            PaymentMethod,
            PaymentStatus,
            PaymentInit,
            SignupRequest,
            LoginRequest,
            RefreshRequest,
            TokenPair,
            AuthSession,
            MeResponse,
            ProductDetail,
            ProductList,
            OrderLineRequest,
            CreateOrderRequest,
            OrderItemDetail,
            OrderDetail,
            CreatedOrder,
            OrderList,
            CreateEventRequest,
            EventCreated,
            UpdateOrderStatusRequest,
            LowStockList,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<ProductDetail>,
            ApiResponse<ProductList>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<CreatedOrder>,
            ApiResponse<AuthSession>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Auth", description = "Signup, login and token refresh"),
        (name = "Products", description = "Catalog browsing"),
        (name = "Orders", description = "Checkout and payment verification"),
        (name = "Events", description = "Analytics events"),
        (name = "Admin", description = "Order fulfilment and stock monitoring"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_public_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/auth/signup",
            "/api/products",
            "/api/products/{id}",
            "/api/orders",
            "/api/orders/{id}/verify-payment",
            "/api/events",
            "/api/admin/orders/{id}/status",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = doc.components.expect("components").security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }
}
