use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use messenger_store::cql::{self, Keyspace};
use messenger_store::{Config, MessengerStore, PgStore, StoreError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "messenger-store", about = "Bootstraps the messenger conversation store")]
struct Cli {
        #[command(subcommand)]
        command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
        /// Apply pending migrations to DATABASE_URL
        Migrate,
        /// Print the keyspace and table statements for a Cassandra cluster
        Cql,
}

fn main() -> Result<(), StoreError> {
        dotenv().ok();

        tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .init();

        let cli = Cli::parse();
        let config = Config::from_env()?;

        match cli.command.unwrap_or(Command::Migrate) {
                Command::Migrate => {
                        let store = PgStore::connect(&config).inspect_err(|e| error!("failed to connect: {e}"))?;
                        store.ensure_schema()?;
                        info!("migrations complete");
                }
                Command::Cql => {
                        for statement in cql::schema_statements(&Keyspace::from_config(&config)) {
                                println!("{statement}\n");
                        }
                }
        }

        Ok(())
}
