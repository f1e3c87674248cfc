//! Minetune CLI - operator surface for the recommendation core
//!
//! Commands:
//! - credential lifecycle (save/delete)
//! - device reads (summary, chips, telemetry)
//! - recommendation apply with dry-run default and explicit commit
//! - selftest exercising the full stack

use anyhow::{anyhow, bail, Context, Result};
use minetune_core::{
    CoreConfig, CredentialOverride, CredentialResolver, FileSecretStore, FirmwareConnector,
    FirmwareControl, HttpConnector, KeyringSecretStore, MemorySecretStore, Recommendation,
    SecretStore, StoreBackend, TuningOrchestrator,
};
use tracing::{info, warn};

struct App {
    config: CoreConfig,
}

impl App {
    fn secret_store(&self) -> Result<Box<dyn SecretStore>> {
        Ok(match self.config.store.backend {
            StoreBackend::File => {
                let path = self.config.store.file_path()?;
                Box::new(FileSecretStore::new(path)?)
            }
            StoreBackend::Keyring => Box::new(KeyringSecretStore::new(
                self.config.store.keyring_service.clone(),
            )),
        })
    }

    fn resolver(&self) -> Result<CredentialResolver> {
        Ok(CredentialResolver::new(
            self.secret_store()?,
            CredentialOverride::from_env(),
        ))
    }

    fn orchestrator(&self) -> Result<TuningOrchestrator<HttpConnector>> {
        Ok(TuningOrchestrator::new(
            self.resolver()?,
            self.config.capabilities,
            HttpConnector::new(self.config.firmware.clone()),
        ))
    }

    /// Resolve credentials and open a client to the target device
    fn device_client(&self, host: Option<&str>) -> Result<minetune_core::FirmwareClient> {
        let credential = self
            .resolver()?
            .resolve(host)
            .context("Failed to resolve credentials")?;
        let connector = HttpConnector::new(self.config.firmware.clone());
        Ok(connector.connect(&credential.host, &credential)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = CoreConfig::load().await.context("Failed to load config")?;
    let app = App { config };

    match args.first().map(String::as_str) {
        Some("credentials") => run_credentials(&app, &args[1..]).await,
        Some("summary") => {
            let client = app.device_client(args.get(1).map(String::as_str))?;
            println!("{}", serde_json::to_string_pretty(&client.get_summary().await?)?);
            Ok(())
        }
        Some("chips") => {
            let client = app.device_client(args.get(1).map(String::as_str))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&client.get_chips_status().await?)?
            );
            Ok(())
        }
        Some("telemetry") => {
            let client = app.device_client(args.get(1).map(String::as_str))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&client.get_telemetry().await?)?
            );
            Ok(())
        }
        Some("apply") => run_apply(&app, &args[1..]).await,
        Some("selftest") => run_selftest(&app, args.get(1).map(String::as_str)).await,
        Some("help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}");
        }
    }
}

fn print_usage() {
    println!("minetune - apply tuning recommendations to ASIC miners");
    println!();
    println!("USAGE:");
    println!("  minetune credentials save <host> <username> <password> [--default]");
    println!("  minetune credentials delete <host>");
    println!("  minetune summary [host]");
    println!("  minetune chips [host]");
    println!("  minetune telemetry [host]");
    println!("  minetune apply <recommendation.json> --miner <ip> [--commit]");
    println!("  minetune selftest [host]");
    println!();
    println!("Without [host], the VNISH_HOST/VNISH_USERNAME/VNISH_PASSWORD");
    println!("override or the stored default credential is used.");
}

async fn run_credentials(app: &App, args: &[String]) -> Result<()> {
    let resolver = app.resolver()?;
    match args.first().map(String::as_str) {
        Some("save") => {
            let host = args.get(1).ok_or_else(|| anyhow!("missing <host>"))?;
            let username = args.get(2).ok_or_else(|| anyhow!("missing <username>"))?;
            let password = args.get(3).ok_or_else(|| anyhow!("missing <password>"))?;
            let is_default = args.iter().any(|a| a == "--default");
            resolver
                .save(host, username, password, is_default)
                .context("Failed to save credentials")?;
            info!(host, is_default, "credentials saved");
            Ok(())
        }
        Some("delete") => {
            let host = args.get(1).ok_or_else(|| anyhow!("missing <host>"))?;
            let existed = resolver
                .delete(host)
                .context("Failed to delete credentials")?;
            if existed {
                info!(host, "credentials deleted");
            } else {
                warn!(host, "no credentials stored for host");
            }
            Ok(())
        }
        _ => bail!("usage: minetune credentials <save|delete> ..."),
    }
}

async fn run_apply(app: &App, args: &[String]) -> Result<()> {
    let file = args
        .first()
        .ok_or_else(|| anyhow!("missing <recommendation.json>"))?;
    let miner_ip = args
        .iter()
        .position(|a| a == "--miner")
        .and_then(|i| args.get(i + 1))
        .ok_or_else(|| anyhow!("missing --miner <ip>"))?;
    let dry_run = !args.iter().any(|a| a == "--commit");

    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {file}"))?;
    let recommendation =
        Recommendation::from_json(&raw).map_err(|e| anyhow!("rejected recommendation: {e}"))?;

    if dry_run {
        info!("dry run - no control write will be sent (use --commit to apply)");
    }
    let orchestrator = app.orchestrator()?;
    let result = orchestrator.apply(&recommendation, miner_ip, dry_run).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Exercise the stack end to end: credential round-trip on a scratch
/// store, then the three recommendation kinds applied as dry runs
async fn run_selftest(app: &App, host: Option<&str>) -> Result<()> {
    info!("testing credential round-trip...");
    let scratch = CredentialResolver::new(Box::new(MemorySecretStore::new()), None);
    scratch.save("192.168.1.101", "admin", "admin", true)?;
    let credential = scratch.resolve(Some("192.168.1.101"))?;
    if credential.username != "admin" || !credential.is_default {
        bail!("credential round-trip returned unexpected values");
    }
    if !scratch.delete("192.168.1.101")? {
        bail!("credential delete reported no entry");
    }
    info!("credential round-trip passed");

    let resolver = app.resolver()?;
    let credential = match resolver.resolve(host) {
        Ok(credential) => credential,
        Err(e) => {
            warn!("no miner credentials available ({e}); skipping device checks");
            warn!("set VNISH_HOST/VNISH_USERNAME/VNISH_PASSWORD or save credentials first");
            return Ok(());
        }
    };
    let miner_ip = credential.host.clone();
    let miner_id = format!("miner_{miner_ip}");

    // Seed a scratch resolver with the resolved triple so the apply
    // path sees the credential regardless of where it came from
    let device_resolver = CredentialResolver::new(Box::new(MemorySecretStore::new()), None);
    device_resolver.save(&miner_ip, &credential.username, &credential.password, true)?;
    let orchestrator = TuningOrchestrator::new(
        device_resolver,
        app.config.capabilities,
        HttpConnector::new(app.config.firmware.clone()),
    );

    let recommendations = [
        Recommendation::DynamicHashrateTuning {
            id: uuid::Uuid::new_v4().to_string(),
            miner_id: miner_id.clone(),
            recommended_hashrate_percent: 80.0,
        },
        Recommendation::PowerOptimization {
            id: uuid::Uuid::new_v4().to_string(),
            miner_id: miner_id.clone(),
            power_reduction_percent: 15.0,
        },
        Recommendation::IntelligentOverclocking {
            id: uuid::Uuid::new_v4().to_string(),
            miner_id,
            core_clock_offset: 50,
            memory_clock_offset: 200,
            power_limit_percent: 85.0,
            core_voltage_offset: 10,
        },
    ];

    for recommendation in &recommendations {
        info!(kind = recommendation.kind(), "dry-run apply...");
        let result = orchestrator.apply(recommendation, &miner_ip, true).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        if !result.success {
            bail!("selftest dry run failed for {}", recommendation.kind());
        }
    }

    info!("all selftest checks passed");
    Ok(())
}
