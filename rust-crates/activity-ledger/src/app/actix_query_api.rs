use crate::{
    app::{
        Reconstruction,
        SnapshotReport,
        ledger_store::AccountKey,
        query_api::{
            Query,
            QueryAPI,
            Responder,
        },
    },
    error::LedgerError,
};
use actix_web::{
    App,
    HttpServer,
    dev::ServerHandle,
    error::{
        ErrorBadGateway,
        ErrorBadRequest,
        ErrorInternalServerError,
        ErrorServiceUnavailable,
    },
    web,
};
use alloy_primitives::Address;
use anyhow::{
    Context,
    anyhow,
};
use std::{
    net::TcpListener,
    str::FromStr,
    thread::JoinHandle,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

pub struct ActixQueryApi {
    receiver: mpsc::Receiver<Query>,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ActixQueryApi {
    pub async fn new(port: Option<u16>) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel(16);

        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for query API")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("query API listening on {}", base_url);

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(sender.clone()))
                .route(
                    "/snapshot/{contract}/{user}",
                    web::get().to(handle_snapshot),
                )
                .route("/ledger/{contract}/{user}", web::get().to(handle_ledger))
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            receiver,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl QueryAPI for ActixQueryApi {
    async fn query(&mut self) -> anyhow::Result<Query> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| anyhow!("query server closed"))
    }
}

impl Drop for ActixQueryApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

fn parse_account(path: &(String, String)) -> actix_web::Result<AccountKey> {
    let (contract, user) = path;
    let contract = Address::from_str(contract)
        .map_err(|_| ErrorBadRequest(format!("invalid contract address '{contract}'")))?;
    let user = Address::from_str(user)
        .map_err(|_| ErrorBadRequest(format!("invalid user address '{user}'")))?;
    Ok(AccountKey::new(contract, user))
}

fn into_http_error(error: LedgerError) -> actix_web::Error {
    match error {
        LedgerError::Config(_) | LedgerError::Client(_) => {
            ErrorServiceUnavailable(error.to_string())
        }
        LedgerError::Fetch { .. } | LedgerError::Decode(_) => {
            ErrorBadGateway(error.to_string())
        }
    }
}

async fn forward<T>(
    sender: &mpsc::Sender<Query>,
    make_query: impl FnOnce(Responder<T>) -> Query,
) -> actix_web::Result<T> {
    let (response_sender, response_receiver) = oneshot::channel();
    sender
        .send(make_query(response_sender))
        .await
        .map_err(|_| ErrorInternalServerError("unable to forward query"))?;
    response_receiver
        .await
        .map_err(|_| ErrorInternalServerError("query responder dropped"))?
        .map_err(into_http_error)
}

async fn handle_snapshot(
    sender: web::Data<mpsc::Sender<Query>>,
    path: web::Path<(String, String)>,
) -> actix_web::Result<web::Json<SnapshotReport>> {
    let key = parse_account(&path)?;
    tracing::info!("received snapshot request for {}", key.user);
    let report = forward(sender.get_ref(), |responder| Query::snapshot(key, responder)).await?;
    Ok(web::Json(report))
}

async fn handle_ledger(
    sender: web::Data<mpsc::Sender<Query>>,
    path: web::Path<(String, String)>,
) -> actix_web::Result<web::Json<Reconstruction>> {
    let key = parse_account(&path)?;
    tracing::info!("received ledger request for {}", key.user);
    let reconstruction =
        forward(sender.get_ref(), |responder| Query::ledger(key, responder)).await?;
    Ok(web::Json(reconstruction))
}
