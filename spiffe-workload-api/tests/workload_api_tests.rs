//! The four Workload API operations against a scripted agent.

mod common;

use std::time::Duration;

use prost::Message;
use spiffe_workload_api::{CancellationToken, Status, WorkloadApiClient};
use spire_agent_mock::proto;
use spire_agent_mock::server::{
    MockAgent, Reply, FETCH_JWT_BUNDLES_PATH, FETCH_JWT_SVID_PATH, FETCH_X509_BUNDLES_PATH,
    FETCH_X509_SVID_PATH,
};

// Synthetic DER SEQUENCEs; the splitter only reads the outer TLV.
const CERT_A: [u8; 4] = [0x30, 0x02, 0x01, 0x01];
const CERT_B: [u8; 4] = [0x30, 0x02, 0x02, 0x02];

#[tokio::test]
async fn fetch_jwt_svid_returns_server_svids() {
    common::init_tracing();
    let (_dir, socket) = common::socket_path();

    let reply = Reply::message(&proto::JwtsvidResponse {
        svids: vec![proto::Jwtsvid {
            spiffe_id: "spiffe://example.org/workload".to_owned(),
            svid: "eyJhbGciOiJFUzI1NiJ9.e30.c2ln".to_owned(),
            hint: "internal".to_owned(),
        }],
    });
    let agent = MockAgent::new()
        .route(FETCH_JWT_SVID_PATH, reply)
        .spawn(&socket)
        .unwrap();

    let client = WorkloadApiClient::new(&socket);
    let svids = client
        .fetch_jwt_svid(&["zti".to_owned()], None, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(svids.len(), 1);
    assert_eq!(svids[0].spiffe_id, "spiffe://example.org/workload");
    assert_eq!(svids[0].svid, "eyJhbGciOiJFUzI1NiJ9.e30.c2ln");
    assert_eq!(svids[0].hint, "internal");

    // The request really carried the audience and an empty spiffe_id.
    let requests = agent.requests();
    assert_eq!(requests.len(), 1);
    let request = proto::JwtsvidRequest::decode(&requests[0].body[5..]).unwrap();
    assert_eq!(request.audience, vec!["zti".to_owned()]);
    assert!(request.spiffe_id.is_empty());
}

#[tokio::test]
async fn fetch_jwt_svid_forwards_spiffe_id() {
    let (_dir, socket) = common::socket_path();
    let agent = MockAgent::new()
        .route(
            FETCH_JWT_SVID_PATH,
            Reply::message(&proto::JwtsvidResponse::default()),
        )
        .spawn(&socket)
        .unwrap();

    let client = WorkloadApiClient::new(&socket);
    let svids = client
        .fetch_jwt_svid(
            &["zti".to_owned()],
            Some("spiffe://example.org/specific"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert!(svids.is_empty());

    let request = proto::JwtsvidRequest::decode(&agent.requests()[0].body[5..]).unwrap();
    assert_eq!(request.spiffe_id, "spiffe://example.org/specific");
}

#[tokio::test]
async fn x509_svid_stream_delivers_updates_in_order() {
    common::init_tracing();
    let (_dir, socket) = common::socket_path();

    let responses: Vec<proto::X509svidResponse> = (0..3)
        .map(|i| {
            let mut chain = CERT_A.to_vec();
            chain.extend_from_slice(&CERT_B);
            proto::X509svidResponse {
                svids: vec![proto::X509svid {
                    spiffe_id: format!("spiffe://example.org/workload/{i}"),
                    x509_svid: chain,
                    x509_svid_key: vec![0x0A, 0x0B],
                    bundle: CERT_B.to_vec(),
                    hint: String::new(),
                }],
                crl: vec![vec![0x01, 0x02]],
                federated_bundles: [("other.org".to_owned(), CERT_A.to_vec())]
                    .into_iter()
                    .collect(),
            }
        })
        .collect();

    let _agent = MockAgent::new()
        .route(FETCH_X509_SVID_PATH, Reply::messages(&responses))
        .spawn(&socket)
        .unwrap();

    let client = WorkloadApiClient::new(&socket);
    let cancel = CancellationToken::new();
    let mut seen = Vec::new();
    let status = client
        .fetch_x509_svid(
            |context| {
                assert_eq!(context.svids.len(), 1);
                let svid = &context.svids[0];
                assert_eq!(svid.chain, vec![CERT_A.to_vec(), CERT_B.to_vec()]);
                assert_eq!(svid.private_key, vec![0x0A, 0x0B]);
                assert_eq!(svid.bundle, vec![CERT_B.to_vec()]);
                assert_eq!(context.crl, vec![vec![0x01, 0x02]]);
                assert_eq!(
                    context.federated_bundles["other.org"],
                    vec![CERT_A.to_vec()]
                );
                seen.push(svid.spiffe_id.clone());
                Status::ok()
            },
            &cancel,
        )
        .await;

    assert!(status.is_ok(), "unexpected status: {status}");
    assert_eq!(
        seen,
        vec![
            "spiffe://example.org/workload/0".to_owned(),
            "spiffe://example.org/workload/1".to_owned(),
            "spiffe://example.org/workload/2".to_owned(),
        ]
    );
}

#[tokio::test]
async fn x509_bundles_stream_splits_bundles() {
    let (_dir, socket) = common::socket_path();

    let mut concatenated = CERT_A.to_vec();
    concatenated.extend_from_slice(&CERT_B);
    let response = proto::X509BundlesResponse {
        crl: vec![vec![0xCC]],
        bundles: [("example.org".to_owned(), concatenated)]
            .into_iter()
            .collect(),
    };
    let _agent = MockAgent::new()
        .route(FETCH_X509_BUNDLES_PATH, Reply::message(&response))
        .spawn(&socket)
        .unwrap();

    let client = WorkloadApiClient::new(&socket);
    let cancel = CancellationToken::new();
    let mut updates = Vec::new();
    let status = client
        .fetch_x509_bundles(
            |context| {
                updates.push(context);
                Status::ok()
            },
            &cancel,
        )
        .await;

    assert!(status.is_ok());
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].crl, vec![vec![0xCC]]);
    assert_eq!(
        updates[0].bundles["example.org"],
        vec![CERT_A.to_vec(), CERT_B.to_vec()]
    );
}

#[tokio::test]
async fn jwt_bundles_stream_maps_trust_domains() {
    let (_dir, socket) = common::socket_path();

    let response = proto::JwtBundlesResponse {
        bundles: [
            ("example.org".to_owned(), br#"{"keys":[]}"#.to_vec()),
            ("other.org".to_owned(), br#"{"keys":[{}]}"#.to_vec()),
        ]
        .into_iter()
        .collect(),
    };
    let _agent = MockAgent::new()
        .route(FETCH_JWT_BUNDLES_PATH, Reply::message(&response))
        .spawn(&socket)
        .unwrap();

    let client = WorkloadApiClient::new(&socket);
    let cancel = CancellationToken::new();
    let mut updates = Vec::new();
    let status = client
        .fetch_jwt_bundles(
            |bundles| {
                updates.push(bundles);
                Status::ok()
            },
            &cancel,
        )
        .await;

    assert!(status.is_ok());
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].bundles.len(), 2);
    assert_eq!(updates[0].bundles["example.org"], br#"{"keys":[]}"#);
    assert_eq!(updates[0].bundles["other.org"], br#"{"keys":[{}]}"#);
}

#[tokio::test]
async fn decode_failure_surfaces_as_internal() {
    let (_dir, socket) = common::socket_path();

    // A well-formed frame whose payload is not a valid protobuf
    // message for this method.
    let reply = Reply::default().with_chunk(spire_agent_mock::frame(&[0xFF, 0xFF, 0xFF, 0xFF]));
    let _agent = MockAgent::new()
        .route(FETCH_JWT_BUNDLES_PATH, reply)
        .spawn(&socket)
        .unwrap();

    let client = WorkloadApiClient::new(&socket);
    let cancel = CancellationToken::new();
    let status = client
        .fetch_jwt_bundles(|_| panic!("callback must not run"), &cancel)
        .await;

    assert_eq!(status.code, spiffe_workload_api::code::INTERNAL);
    assert_eq!(status.message, "decode gRPC response failed");
}
