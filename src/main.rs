use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use litter_relay::config::Config;
use litter_relay::sinks::{AuditLog, MqttPublisher, PublishSink, RecordSink, SqliteRecordSink};
use litter_relay::{init_tracing, ObservationPipeline, PipelineSettings, RelayEngine, Result, Sinks};

// cargo run --bin litter-relay -- ./litter.db ./litter.log

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// SQLite file records are appended to (overrides RELAY_DB_PATH)
    db_path: Option<PathBuf>,

    /// Plaintext audit log (overrides RELAY_AUDIT_LOG)
    audit_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = Config::global();
    init_tracing(&config.log.level);

    let storage: Option<Box<dyn RecordSink>> = match args.db_path.or_else(|| config.storage.db_path.clone()) {
        Some(path) => Some(Box::new(SqliteRecordSink::open(path)?)),
        None => None,
    };

    let audit = match args.audit_log.or_else(|| config.audit.log_path.clone()) {
        Some(path) => {
            info!("Audit log at {:?}", path);
            Some(AuditLog::open(path)?)
        }
        None => None,
    };

    let publisher: Option<Arc<dyn PublishSink>> = if config.publish.enabled {
        info!(
            "Publishing to MQTT broker at {}:{}",
            config.publish.broker_host, config.publish.broker_port
        );
        Some(Arc::new(MqttPublisher::new(&config.publish)))
    } else {
        None
    };

    let pipeline = ObservationPipeline::new(
        PipelineSettings::from(&config.publish),
        Sinks {
            storage,
            publisher,
            audit,
        },
    );

    let engine = RelayEngine::bind(&config.relay, pipeline).await?;
    engine.run().await;

    Ok(())
}
