#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
use {chanargs_test::cases, tracing_subscriber::EnvFilter};

#[cfg(not(all(unix, not(any(target_os = "solaris", target_os = "illumos")))))]
fn main() {
    eprintln!("channel argument scenarios need SO_REUSEPORT and are not supported on this platform");
    std::process::exit(1);
}

#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Channel Argument Tests ===");

    let results = vec![
        (
            "server SO_REUSEPORT follows options",
            cases::server_reuse_port_is_set_properly().await,
        ),
        (
            "client accepts heterogeneous options",
            cases::client_accepts_heterogeneous_options().await,
        ),
        (
            "server accepts heterogeneous options",
            cases::server_accepts_heterogeneous_options().await,
        ),
        (
            "client rejects malformed options",
            cases::invalid_client_options_rejected().await,
        ),
        (
            "max receive message length applied",
            cases::max_message_length_applied().await,
        ),
        (
            "server send limit applied",
            cases::server_send_limit_applied().await,
        ),
        ("unary limits applied", cases::unary_limits_applied().await),
        (
            "closed channel cancels calls",
            cases::closed_channel_cancels_calls().await,
        ),
        (
            "server stop cancels in-flight calls",
            cases::server_stop_cancels_in_flight_calls().await,
        ),
    ];

    let total = results.len();
    let mut passed = 0;
    for (name, result) in results {
        match result {
            Ok(()) => {
                println!("  PASS  {name}");
                passed += 1;
            }
            Err(e) => println!("  FAIL  {name}: {e:#}"),
        }
    }

    println!();
    println!("{passed}/{total} passed");

    if passed < total {
        std::process::exit(1);
    }

    Ok(())
}
