// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::BytesMut;
use pinpoint_collector::bulk::{BulkFactory, BulkOperationReporterFactory, BulkWriter};
use pinpoint_collector::codec::{Frame, FrameCodec, MAX_FRAME_SIZE};
use pinpoint_collector::config::BulkProperties;
use pinpoint_collector::handler::SpanHandler;
use pinpoint_collector::message::{
    PAcceptEvent, PAgentHandshake, PParentInfo, PSpan, PSpanEvent, PSqlMetaData, PTransactionId,
};
use pinpoint_collector::metadata_service::MetadataService;
use pinpoint_collector::receiver::IngestReceiver;
use pinpoint_collector::span_store::{InMemorySpanStore, SpanStore};
use pinpoint_collector::statistics::StatisticsService;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::id::TransactionId;
use pinpoint_common::statistics::{CallRowKey, CallerColumnName, ResponseColumnName, RowKey};
use pinpoint_common::store::{InMemoryStore, Store};
use pinpoint_common::table::{ColumnFamily, TableNameProvider};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

struct Pipeline {
    store: Arc<InMemoryStore>,
    span_store: Arc<InMemorySpanStore>,
    statistics: Arc<StatisticsService>,
    handler: Arc<SpanHandler>,
    reporters: Arc<BulkOperationReporterFactory>,
}

fn pipeline(properties: BulkProperties) -> Pipeline {
    let store = Arc::new(InMemoryStore::new());
    let span_store = Arc::new(InMemorySpanStore::new());
    let distributor = Arc::new(RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid"));
    let table_names = Arc::new(TableNameProvider::default());
    let reporters = Arc::new(BulkOperationReporterFactory::new());
    let limit_size = properties.limit_size;
    let callee_limit_size = properties.callee_limit_size;
    let factory = BulkFactory::new(
        properties,
        Arc::clone(&distributor),
        Arc::clone(&table_names),
        store.clone(),
        Arc::clone(&reporters),
    );
    let statistics = Arc::new(StatisticsService::new(
        factory.new_bulk_writer("caller", &ColumnFamily::MAP_STATISTICS_CALLER_COUNTER, limit_size),
        factory.new_bulk_writer(
            "callee",
            &ColumnFamily::MAP_STATISTICS_CALLEE_COUNTER,
            callee_limit_size,
        ),
        factory.new_bulk_writer("self", &ColumnFamily::MAP_STATISTICS_SELF_COUNTER, limit_size),
    ));
    let metadata = Arc::new(MetadataService::new(distributor, table_names, store.clone()));
    let handler = Arc::new(SpanHandler::new(
        span_store.clone(),
        Arc::clone(&statistics),
        metadata,
    ));
    Pipeline {
        store,
        span_store,
        statistics,
        handler,
        reporters,
    }
}

#[tokio::test]
async fn bulk_overflow_drops_and_reports_new_cells() {
    let store = Arc::new(InMemoryStore::new());
    let reporters = Arc::new(BulkOperationReporterFactory::new());
    let factory = BulkFactory::new(
        BulkProperties {
            limit_size: 100,
            ..Default::default()
        },
        Arc::new(RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid")),
        Arc::new(TableNameProvider::default()),
        store.clone(),
        Arc::clone(&reporters),
    );
    let writer = factory.new_bulk_writer("self", &ColumnFamily::MAP_STATISTICS_SELF_COUNTER, 100);
    let column = ResponseColumnName {
        slot: 1000,
        agent_id: "agent-1".to_string(),
    };

    for slot in 0..150 {
        let row_key = CallRowKey::new("order-api", 1010, slot * 60_000).expect("valid");
        writer.increment(&row_key, &column).await;
    }

    let reporter = reporters.get_reporter("self");
    assert_eq!(reporter.increment_reject_count(), 50);

    writer.flush_link().await;
    assert_eq!(store.applied_increments(), 100);
    let table = TableNameProvider::default().table_name(&ColumnFamily::MAP_STATISTICS_SELF_COUNTER);
    assert_eq!(store.row_count(table), 100);
    assert_eq!(reporter.flush_all_count(), 100);
}

#[tokio::test]
async fn bulk_increments_add_up_across_flushes() {
    let p = pipeline(BulkProperties::default());
    let writers = p.statistics.writers();
    let row_key = CallRowKey::new("order-api", 1010, 0).expect("valid");
    let column = ResponseColumnName {
        slot: 1000,
        agent_id: "agent-1".to_string(),
    };

    for round in 0..3 {
        for _ in 0..10 {
            writers[2].increment(&row_key, &column).await;
        }
        if round < 2 {
            writers[2].flush_link().await;
        }
    }
    writers[2].flush_link().await;

    let distributor = RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid");
    let table = TableNameProvider::default().table_name(&ColumnFamily::MAP_STATISTICS_SELF_COUNTER);
    let row = p
        .store
        .get(table, &distributor.distributed_key(&row_key.row_key(0)))
        .await
        .expect("store")
        .expect("row");
    assert_eq!(row.cells[0].value_as_i64(), Some(30));
    assert_eq!(p.reporters.get_reporter("self").increment_reject_count(), 0);
}

fn encode(frames: Vec<Frame>) -> BytesMut {
    let mut codec = FrameCodec::new(MAX_FRAME_SIZE);
    let mut buf = BytesMut::new();
    for frame in frames {
        codec.encode(frame, &mut buf).expect("encodes");
    }
    buf
}

fn handshake() -> Frame {
    Frame::Handshake(PAgentHandshake {
        agent_id: "agent-1".to_string(),
        agent_name: "order-api-1".to_string(),
        application_name: "order-api".to_string(),
        agent_start_time: 1_000,
        service_type: 1010,
    })
}

fn span() -> Frame {
    Frame::Span(PSpan {
        version: 1,
        transaction_id: Some(PTransactionId {
            agent_id: "front-1".to_string(),
            agent_start_time: 500,
            sequence: 3,
        }),
        span_id: 42,
        parent_span_id: 41,
        start_time: 1_409_814_914_000,
        elapsed: 120,
        service_type: 1010,
        application_service_type: 1010,
        accept_event: Some(PAcceptEvent {
            rpc: "/orders".to_string(),
            end_point: "order-api:8080".to_string(),
            remote_addr: "10.0.0.2".to_string(),
            parent_info: Some(PParentInfo {
                parent_application_name: "front".to_string(),
                parent_application_type: 1210,
                acceptor_host: "order-api:8080".to_string(),
            }),
        }),
        span_event: vec![PSpanEvent {
            sequence: 0,
            depth: 1,
            service_type: 2100,
            end_elapsed: 20,
            ..Default::default()
        }],
        ..Default::default()
    })
}

async fn start_receiver(handler: Arc<SpanHandler>) -> (String, CancellationToken) {
    let cancel_token = CancellationToken::new();
    let receiver = IngestReceiver::new("127.0.0.1:0", handler, MAX_FRAME_SIZE, cancel_token.clone())
        .await
        .expect("bind receiver");
    let addr = receiver.local_addr().expect("local addr").to_string();
    tokio::spawn(receiver.spin());
    (addr, cancel_token)
}

async fn wait_for(condition: impl Fn() -> bool) {
    let waited = timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for the receiver");
}

#[tokio::test]
async fn receiver_binds_stores_and_derives_statistics() {
    let p = pipeline(BulkProperties {
        enable: false,
        ..Default::default()
    });
    let (addr, cancel_token) = start_receiver(Arc::clone(&p.handler)).await;

    let mut stream = TcpStream::connect(&addr).await.expect("connect");
    let frames = encode(vec![
        handshake(),
        span(),
        Frame::SqlMetaData(PSqlMetaData {
            sql_id: 9,
            sql: "SELECT * FROM orders".to_string(),
        }),
    ]);
    stream.write_all(&frames).await.expect("write");

    let handler = Arc::clone(&p.handler);
    wait_for(move || handler.accepted_count() == 2).await;

    let trace = p
        .span_store
        .select_trace(&TransactionId::new("front-1", 500, 3))
        .await
        .expect("read");
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].agent_id, "agent-1");
    assert_eq!(trace[0].parent_application_name.as_deref(), Some("front"));

    // inbound link from the parent application
    let table_names = TableNameProvider::default();
    let callee_table = table_names.table_name(&ColumnFamily::MAP_STATISTICS_CALLEE_COUNTER);
    let rows = p
        .store
        .scan(callee_table, &[], &[0xff; 64])
        .await
        .expect("scan");
    assert_eq!(rows.len(), 1);
    let callers: Vec<_> = rows[0]
        .cells
        .iter()
        .map(|cell| CallerColumnName::decode(&cell.qualifier).expect("column"))
        .collect();
    assert!(callers.iter().all(|c| c.caller_application_name == "front"));
    assert!(callers.iter().any(|c| c.slot == 1000));

    // the MYSQL event has no destination, so no outbound link
    let caller_table = table_names.table_name(&ColumnFamily::MAP_STATISTICS_CALLER_COUNTER);
    assert_eq!(p.store.row_count(caller_table), 0);
    assert_eq!(
        p.store
            .row_count(table_names.table_name(&ColumnFamily::SQL_METADATA_SQL)),
        1
    );

    cancel_token.cancel();
}

#[tokio::test]
async fn receiver_requires_handshake() {
    let p = pipeline(BulkProperties::default());
    let (addr, cancel_token) = start_receiver(Arc::clone(&p.handler)).await;

    let mut stream = TcpStream::connect(&addr).await.expect("connect");
    stream
        .write_all(&encode(vec![span(), handshake(), span()]))
        .await
        .expect("write");

    // the stream is closed on the first frame, nothing reaches the handler
    sleep(Duration::from_millis(200)).await;
    assert_eq!(p.handler.accepted_count(), 0);
    assert_eq!(p.handler.rejected_count(), 0);
    assert_eq!(p.span_store.trace_count(), 0);

    cancel_token.cancel();
}

#[tokio::test]
async fn receiver_keeps_stream_after_rejected_frame() {
    let p = pipeline(BulkProperties::default());
    let (addr, cancel_token) = start_receiver(Arc::clone(&p.handler)).await;

    let mut invalid = span();
    if let Frame::Span(message) = &mut invalid {
        message.version = 0;
    }
    let mut stream = TcpStream::connect(&addr).await.expect("connect");
    stream
        .write_all(&encode(vec![handshake(), invalid, span()]))
        .await
        .expect("write");

    let handler = Arc::clone(&p.handler);
    wait_for(move || handler.accepted_count() == 1).await;
    assert_eq!(p.handler.rejected_count(), 1);

    cancel_token.cancel();
}
