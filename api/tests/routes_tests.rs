//! HTTP-level tests for the loan routes
//!
//! Validation failures reject before any database I/O, so these run
//! against a lazy pool that never connects.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use loan_api::loan::LoanService;
    use loan_api::publisher::LoanEventPublisher;
    use loan_api::routes;
    use loan_api::state::AppState;
    use loan_messaging::{ChannelBus, RetryPolicy};

    fn test_app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/loan_api_unused")
            .expect("lazy pool");

        let publisher = Arc::new(LoanEventPublisher::new(Arc::new(ChannelBus::new(
            RetryPolicy::none(),
        ))));
        let service = Arc::new(LoanService::new(pool.clone(), publisher));

        Router::new()
            .merge(routes::loan_routes())
            .with_state(AppState::new(service, pool))
    }

    fn post_loans(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/loans")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn test_zero_amount_returns_400() {
        let app = test_app();

        let response = app
            .oneshot(post_loans(
                r#"{"customerId":"CUST-2","amount":0,"terms":24}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("Amount must be greater than 0"));
    }

    #[tokio::test]
    async fn test_out_of_range_terms_returns_400() {
        let app = test_app();

        let response = app
            .oneshot(post_loans(
                r#"{"customerId":"CUST-2","amount":5000,"terms":5}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("Terms must be between 6 and 60 months"));
    }
}
