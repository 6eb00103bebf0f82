use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use spiffe_workload_api::{
    CancellationToken, JwtBundles, Status, WorkloadApiClient, X509BundlesContext, X509SvidContext,
};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = cli::Args::parse();
    let client = Arc::new(WorkloadApiClient::new(&args.socket_path));

    println!(
        "Fetching JWT-SVID for audience {:?} from {} ...",
        args.audience,
        args.socket_path.display()
    );
    match client
        .fetch_jwt_svid(&args.audience, args.spiffe_id.as_deref(), args.timeout())
        .await
    {
        Ok(svids) => {
            for svid in svids {
                println!("JWT-SVID: spiffe_id={} hint={:?}", svid.spiffe_id, svid.hint);
                println!("  {}", svid.svid);
            }
        }
        Err(status) => println!("JWT-SVID fetch failed: {status}"),
    }

    // One token cancels all three streams.
    let cancel = CancellationToken::new();

    let x509_svids = tokio::spawn({
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        async move { client.fetch_x509_svid(print_x509_context, &cancel).await }
    });
    let x509_bundles = tokio::spawn({
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        async move { client.fetch_x509_bundles(print_x509_bundles, &cancel).await }
    });
    let jwt_bundles = tokio::spawn({
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        async move { client.fetch_jwt_bundles(print_jwt_bundles, &cancel).await }
    });

    println!(
        "Watching streams for {}s, ctrl-c to stop early...",
        args.watch_seconds
    );
    tokio::select! {
        () = tokio::time::sleep(args.watch_duration()) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    println!("Cancelling all streaming calls...");
    cancel.cancel();

    let (x509_svids, x509_bundles, jwt_bundles) =
        tokio::join!(x509_svids, x509_bundles, jwt_bundles);
    print_final("FetchX509SVID", &x509_svids?);
    print_final("FetchX509Bundles", &x509_bundles?);
    print_final("FetchJWTBundles", &jwt_bundles?);

    Ok(())
}

fn print_final(operation: &str, status: &Status) {
    println!(
        "{operation} finished: {} ({})",
        status.code_str(),
        status.message
    );
}

fn print_x509_context(context: X509SvidContext) -> Status {
    println!("X.509 SVID update ({} identities):", context.svids.len());
    for svid in &context.svids {
        println!("  spiffe_id={} hint={:?}", svid.spiffe_id, svid.hint);
        println!(
            "  chain of {}, key of {} bytes, bundle of {}",
            context_len(&svid.chain),
            svid.private_key.len(),
            context_len(&svid.bundle)
        );
        for cert in &svid.chain {
            print!("{}", render_certificate(cert));
        }
    }
    for (trust_domain, bundle) in &context.federated_bundles {
        println!("  federated bundle {trust_domain}: {}", context_len(bundle));
    }
    Status::ok()
}

fn print_x509_bundles(context: X509BundlesContext) -> Status {
    println!("X.509 bundle update:");
    for (trust_domain, bundle) in &context.bundles {
        println!("  {trust_domain}: {}", context_len(bundle));
    }
    if !context.crl.is_empty() {
        println!("  {} CRL(s)", context.crl.len());
    }
    Status::ok()
}

fn print_jwt_bundles(bundles: JwtBundles) -> Status {
    println!("JWT bundle update:");
    for (trust_domain, jwks) in &bundles.bundles {
        println!(
            "  {trust_domain}: {}",
            String::from_utf8_lossy(jwks).trim_end()
        );
    }
    Status::ok()
}

fn context_len(certs: &[Vec<u8>]) -> String {
    format!("{} certificate(s)", certs.len())
}

/// Renders one DER certificate as PEM with its expiry, so the demo
/// output can be piped straight into openssl.
fn render_certificate(der: &[u8]) -> String {
    let expiry = match x509_parser::parse_x509_certificate(der) {
        Ok((_, cert)) => cert
            .validity()
            .not_after
            .to_rfc2822()
            .unwrap_or_else(|_| "unknown".to_string()),
        Err(_) => "unknown".to_string(),
    };
    let pem = pem::encode(&pem::Pem {
        tag: "CERTIFICATE".to_string(),
        contents: der.to_vec(),
    });
    format!("  expires {expiry}\n{pem}")
}
