#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate yatube;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    use yatube::config::{bind_address, log_format, seed_enabled, LogFormat};
    use yatube::core::db::{init_test_data, MemoryStore};

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request};

        pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => Method::Other(other.to_string()),
            };

            let mut builder = Request::builder();
            builder.method(method).uri(req.uri().to_string());
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    builder.header(name.as_str(), val_str);
                }
            }
            builder.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();
            let content_type = spin_resp
                .header("content-type")
                .and_then(|v| v.as_str())
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = spin_resp.body().to_vec();

            actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            )
            .content_type(content_type)
            .body(body)
        }
    }

    fn init_tracing() {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = match log_format() {
            LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
            LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
        };
        if let Err(err) = tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init() {
            eprintln!("failed to install tracing subscriber: {}", err);
        }
    }

    pub async fn run() -> std::io::Result<()> {
        init_tracing();

        let store = web::Data::new(MemoryStore::new());
        if seed_enabled() {
            init_test_data(store.get_ref()).map_err(std::io::Error::other)?;
        }

        let addr = bind_address();
        tracing::info!(%addr, "server listening");

        HttpServer::new(move || {
            App::new()
                .app_data(store.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(addr)?
        .run()
        .await
    }

    async fn handle_all(req: HttpRequest, body: web::Bytes, store: web::Data<MemoryStore>) -> HttpResponse {
        let spin_req = adapter::actix_to_spin_request(&req, body);
        let resp = yatube::respond(store.get_ref(), &spin_req);
        tracing::debug!(method = %req.method(), path = req.path(), status = *resp.status(), "handled");
        adapter::spin_to_actix_response(resp)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
