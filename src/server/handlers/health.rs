use crate::server::{ServerState, Status};
use actix_web::{get, web, HttpResponse};

/// Reports whether the server is operational: returns 200 with a minimal status object.
#[utoipa::path(
    tags = ["platform"],
    responses(
        (status = 200, body = Status, description = "server status"),
    )
)]
#[get("/health")]
pub async fn health(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.status().await)
}

#[cfg(test)]
mod tests {
    use super::health;
    use crate::server::server_state::tests::mock_server_state;
    use actix_web::{
        test::{call_service, init_service, TestRequest},
        web, App,
    };
    use sqlx::PgPool;

    #[sqlx::test]
    async fn reports_200(pool: PgPool) -> anyhow::Result<()> {
        let state = mock_server_state(pool).await?;
        let app = init_service(App::new().app_data(web::Data::new(state)).service(health)).await;

        let response = call_service(&app, TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(response.status(), 200);
        Ok(())
    }
}
