use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use scorewall::{
    HttpClient, HttpClientAdapter, HttpHandler, Upstream, WafEngine,
    config::{ServerConfig, ServerConfigValidator, load_config},
    metrics, tracing_setup,
    utils::GracefulShutdown,
};

const DEFAULT_CONFIG: &str = "scorewall.yaml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = DEFAULT_CONFIG)]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate the configuration and compile every location
    Validate {
        #[clap(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
    /// Write a starter configuration and rules file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
        /// Output path for the starter rules file
        #[clap(short, long, default_value = "rules/core.rules")]
        rules: String,
    },
    /// Start the inspecting server (default)
    Serve {
        #[clap(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config, rules }) => init_config_command(&config, &rules).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    ServerConfigValidator::validate(&config).context("Invalid configuration")?;

    let engine = Arc::new(WafEngine::from_config(&config).context("Failed to build WAF engine")?);
    for snapshot in engine.snapshots() {
        tracing::info!(
            location = %snapshot.name,
            active = snapshot.active,
            learning = snapshot.learning,
            "Configured location"
        );
    }

    let upstream = build_upstream(&config)?;
    let app = HttpHandler::new(engine, upstream).router();

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    tracing::info!(
        "scorewall listening on {} (upstream: {})",
        addr,
        config.upstream.as_deref().unwrap_or("none")
    );

    tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>()
        ) => {
            result.context("Server error")?;
        },
        shutdown_reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received: {:?}", shutdown_reason);
        }
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

fn build_upstream(config: &ServerConfig) -> Result<Option<Upstream>> {
    let Some(base) = config.upstream.as_deref() else {
        return Ok(None);
    };
    let timeout = config
        .upstream_timeout()
        .context("Invalid upstream_timeout")?;
    let client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(timeout).context("Failed to create HTTP client adapter")?,
    );
    Ok(Some(Upstream {
        base: base.parse().context("Failed to parse upstream URL")?,
        client,
    }))
}

/// Validate configuration, compile every location and print a summary
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = ServerConfigValidator::validate(&config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        std::process::exit(1);
    }
    println!("✅ Configuration validation: OK");

    let engine = match WafEngine::from_config(&config) {
        Ok(engine) => {
            println!("✅ Rule compilation: OK");
            engine
        }
        Err(e) => {
            eprintln!("❌ Rule compilation failed:");
            eprintln!("{e:?}");
            println!();
            println!("💡 Common fixes:");
            println!("   • MainRule belongs in main_rules files, not in locations");
            println!("   • Every rule needs an id: and a mz: match zone");
            println!("   • CheckRule takes a quoted \"$TAG >= N\" and BLOCK, ALLOW or LOG");
            std::process::exit(1);
        }
    };

    println!();
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.listen_addr);
    println!(
        "   • Upstream: {}",
        config.upstream.as_deref().unwrap_or("none (answer locally)")
    );
    println!("   • Max Body Size: {} bytes", config.max_body_size);
    for (prefix, scope) in engine.locations().iter() {
        let summary = scope.store.summary();
        println!(
            "   • Location {prefix}: active={}, learning={}, rules={}, whitelists={}, check_rules={}",
            scope.is_active(),
            scope.learning,
            summary.rules,
            summary.whitelist,
            summary.check_rules
        );
    }
    println!();
    println!("🎉 Configuration is valid and ready to use!");
    Ok(())
}

/// Initialize a new configuration file and a starter rules file
async fn init_config_command(config_path: &str, rules_path: &str) -> Result<()> {
    for path in [config_path, rules_path] {
        if Path::new(path).exists() {
            eprintln!("❌ Error: '{path}' already exists");
            std::process::exit(1);
        }
    }

    let default_rules = r#"# Starter rule set. Scores accumulate per tag; CheckRules decide.
MainRule "str:union select" "msg:sql union" "mz:ARGS|BODY|URL" "s:$SQL:8" id:1000;
MainRule "rx:select.+from" "msg:sql select" "mz:ARGS|BODY" "s:$SQL:4" id:1001;
MainRule "str:<script" "msg:script tag" "mz:ARGS|BODY|URL|HEADERS" "s:$XSS:8" id:1100;
MainRule "str:../" "msg:directory traversal" "mz:URL|ARGS" "s:$TRAVERSAL:4" id:1200;
"#;

    let default_config = format!(
        r#"# scorewall configuration

# The address to listen on
listen_addr: "127.0.0.1:8080"

# Allowed requests are forwarded here; remove to answer locally
# upstream: "http://127.0.0.1:3000"
upstream_timeout: "30s"

# Bytes of request body buffered for inspection
max_body_size: 1048576

main_rules:
  - "{rules_path}"

logging:
  level: "info"
  json: false

locations:
  - prefix: "/"
    directives:
      - "SecRulesEnabled"
      - 'CheckRule "$SQL >= 8" BLOCK'
      - 'CheckRule "$XSS >= 8" BLOCK'
      - 'CheckRule "$TRAVERSAL >= 4" BLOCK'
  - prefix: "/static"
    directives:
      - "SecRulesDisabled"
"#
    );

    if let Some(parent) = Path::new(rules_path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create rules directory")?;
    }
    tokio::fs::write(rules_path, default_rules)
        .await
        .context("Failed to write rules file")?;
    tokio::fs::write(config_path, default_config)
        .await
        .context("Failed to write config file")?;

    println!("✅ Created default configuration at: {config_path}");
    println!("✅ Created starter rules at: {rules_path}");
    println!("   Run 'scorewall serve --config {config_path}' to start the server");
    Ok(())
}
