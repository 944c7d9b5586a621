// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use pinpoint_collector::{
    bulk::{BulkFactory, BulkFlusher, BulkOperationReporterFactory},
    codec::MAX_FRAME_SIZE,
    config::CollectorConfig,
    handler::SpanHandler,
    metadata_service::MetadataService,
    receiver::IngestReceiver,
    span_store::InMemorySpanStore,
    statistics::StatisticsService,
};
use pinpoint_common::{
    distributor::RowKeyDistributorByHashPrefix,
    store::InMemoryStore,
    table::{ColumnFamily, TableNameProvider},
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("PINPOINT_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match CollectorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating collector config on startup: {e}");
            return;
        }
    };

    let distributor = match RowKeyDistributorByHashPrefix::with_buckets(config.rowkey_buckets) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!("Invalid row key buckets: {e}");
            return;
        }
    };
    let table_names = Arc::new(TableNameProvider::new(config.table_namespace.clone()));
    let store = Arc::new(InMemoryStore::new());

    let factory = BulkFactory::new(
        config.bulk.clone(),
        Arc::clone(&distributor),
        Arc::clone(&table_names),
        store.clone(),
        Arc::new(BulkOperationReporterFactory::new()),
    );
    let statistics = Arc::new(StatisticsService::new(
        factory.new_bulk_writer(
            "caller",
            &ColumnFamily::MAP_STATISTICS_CALLER_COUNTER,
            config.bulk.limit_size,
        ),
        factory.new_bulk_writer(
            "callee",
            &ColumnFamily::MAP_STATISTICS_CALLEE_COUNTER,
            config.bulk.callee_limit_size,
        ),
        factory.new_bulk_writer(
            "self",
            &ColumnFamily::MAP_STATISTICS_SELF_COUNTER,
            config.bulk.limit_size,
        ),
    ));
    let metadata = Arc::new(MetadataService::new(distributor, table_names, store));
    let handler = Arc::new(SpanHandler::new(
        Arc::new(InMemorySpanStore::new()),
        Arc::clone(&statistics),
        metadata,
    ));

    let cancel_token = CancellationToken::new();

    let flusher = BulkFlusher::new(statistics.writers(), config.bulk.flush_interval());
    let flusher_handle = tokio::spawn(flusher.run(cancel_token.clone()));

    let receiver = match IngestReceiver::new(
        &config.receiver_bind,
        Arc::clone(&handler),
        MAX_FRAME_SIZE,
        cancel_token.clone(),
    )
    .await
    {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to bind ingest receiver on {}: {e}", config.receiver_bind);
            cancel_token.cancel();
            return;
        }
    };
    let receiver_handle = tokio::spawn(receiver.spin());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down collector");
    cancel_token.cancel();

    if let Err(e) = receiver_handle.await {
        error!("Ingest receiver task failed: {e}");
    }
    if let Err(e) = flusher_handle.await {
        error!("Bulk flusher task failed: {e}");
    }
    info!(
        "Collector stopped: {} frames accepted, {} rejected",
        handler.accepted_count(),
        handler.rejected_count()
    );
}
