use anyhow::Result;
use structopt::StructOpt;

use fdb_cli::Fdb;

#[tokio::main]
async fn main() -> Result<()> {
    Fdb::from_args().run().await
}
