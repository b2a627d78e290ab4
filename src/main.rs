//! querygate command line
//!
//! Checks a single SQL statement against the university schema for a given
//! caller and prints the verdict. Exit status: 0 authorized, 1 rejected,
//! 2 on errors.

use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use querygate::authz::{Authorizer, RejectReason, Verdict};
use querygate::catalog::UniversityCatalog;
use querygate::user::UserContext;

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check whether a SQL SELECT is authorized for a caller")]
struct Cli {
    /// Caller role: student, professor or admin
    #[arg(long, env = "QUERYGATE_ROLE")]
    role: String,
    /// Caller numeric id
    #[arg(long, env = "QUERYGATE_USER_ID")]
    user_id: i64,
    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,
    /// SQL text; read from stdin when omitted
    sql: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let sql = match cli.sql {
        Some(sql) => sql,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let authorizer = Authorizer::new(Arc::new(UniversityCatalog::new()));
    let user = UserContext::new(cli.role, cli.user_id);

    match authorizer.authorize(&sql, &user) {
        Ok(verdict) => {
            if cli.json {
                println!("{}", serde_json::to_string(&verdict)?);
            } else {
                match &verdict {
                    Verdict::Authorized => println!("authorized"),
                    Verdict::Rejected(RejectReason::UnknownRole) => {
                        println!("rejected: unknown role")
                    }
                    Verdict::Rejected(RejectReason::UnresolvedTables(tables)) => {
                        println!("rejected: unauthorized tables: {}", tables.join(", "))
                    }
                }
            }
            if !verdict.is_authorized() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
    Ok(())
}
