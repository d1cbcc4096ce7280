use anyhow::Context;

cfg_if::cfg_if! {
    if #[cfg(feature = "filesystem-auth-backend")] {
        use lading_auth::fs_backend::FsAuthProvider as SelectedAuthProvider;
    } else if #[cfg(feature = "yes-auth-backend")] {
        use lading_auth::yes_backend::YesAuthProvider as SelectedAuthProvider;
    } else {
        use lading_auth::no_backend::NoAuthProvider as SelectedAuthProvider;
    }
}
use config::StoreConfig;
use lading_api_types::storage::ObjectStore;
use lading_server::FallbackResolver;
use lading_storage::fs::FsStorageProvider;
use lading_storage::s3_client::S3StorageProvider;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::read_to_string;
use std::time::Duration;
use tokio::net::TcpListener;

pub mod cli;
mod config;

type DynStore = Box<dyn ObjectStore + Send + Sync>;

pub async fn run(args: cli::LadingArgs) -> anyhow::Result<()> {
    let config: config::Config<SelectedAuthProvider> = serde_yaml::from_str(
        &read_to_string(&args.config)
            .with_context(|| format!("Failed to read config file {}, is it present?", args.config.display()))?,
    )
    .context("Failed to deserialize config file, please make sure its in the right format")?;

    let config::Config {
        service,
        upstream,
        auth_config,
        store,
    } = config;

    let addr = service.address;

    let storage_client = open_store(&store).context("Failed to construct storage client")?;
    let auth_client =
        SelectedAuthProvider::new(auth_config).context("Failed to initialize auth client")?;

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build upstream http client")?;
    let upstream = FallbackResolver::new(http_client, upstream);

    if args.check {
        tracing::info!("Config at {} is valid", args.config.display());
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(service.metrics_address)
        .set_buckets(&[
            100e-6, 500e-6, 1e-3, 5e-3, 1e-2, 5e-2, 1e-1, 2e-1, 3e-1, 4e-1, 5e-1, 6e-1, 7e-1, 8e-1,
            9e-1, 1.0, 5.0, 10.0,
        ])
        .context("Failed to set buckets for prometheus")?
        .install()
        .context("Failed to install prometheus exporter")?;

    let router = lading_server::router(service, storage_client, auth_client, upstream);

    tracing::info!(
        ?addr,
        "Starting lading instance with {} store and {} auth",
        match store {
            StoreConfig::StoreFs(_) => "filesystem",
            StoreConfig::StoreS3(_) => "s3",
        },
        std::any::type_name::<SelectedAuthProvider>()
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Lading server exited with error")?;

    tracing::info!("Completed graceful shutdown");

    Ok(())
}

fn open_store(store: &StoreConfig) -> anyhow::Result<DynStore> {
    let name = store.name()?;
    let opened: DynStore = match store {
        StoreConfig::StoreFs(fs) => Box::new(FsStorageProvider::new(fs.root.clone(), &name)?),
        StoreConfig::StoreS3(s3) => Box::new(S3StorageProvider::new(
            &name,
            &s3.endpoint_url,
            &s3.region,
            &s3.access_key_id()?,
            &s3.access_key_secret()?,
        )?),
    };
    Ok(opened)
}

// Based on: https://github.com/tokio-rs/axum/blob/main/examples/graceful-shutdown/src/main.rs
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal;

        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, beginning graceful shutdown");
}
