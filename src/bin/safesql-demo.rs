use std::process::ExitCode;

use tracing::{error, info};
use safesql::{
    config::{self, Config, LoggingConfig},
    demo::{self, Customer},
    Database, DataSource, Result,
};

fn main() -> ExitCode {
    // Parse CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => match config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => Config {
            database: DataSource::in_memory(),
            logging: LoggingConfig::default(),
        },
    };

    // Initialize the logging system using tracing subscriber
    let level = config.logging.level().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting safesql-demo...");

    match run(&config.database) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Demo failed");
            eprintln!("Demo failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(source: &DataSource) -> Result<()> {
    let db = Database::open(source)?;
    println!("Connected to {}", source.path);
    demo::apply_schema(&db)?;

    let mut eko = Customer::new("eko", "Eko");
    eko.email = Some("eko@gmail.com".to_string());
    eko.balance = 100_000;
    eko.rating = 90.5;
    eko.married = true;
    demo::insert_customer(&db, &eko)?;
    demo::insert_customer(&db, &Customer::new("budi", "Budi"))?;
    println!("success insert new customer");

    for customer in demo::list_customers(&db)? {
        println!("================");
        println!("Id: {}", customer.id);
        println!("Name: {}", customer.name);
        if let Some(email) = &customer.email {
            println!("Email: {}", email);
        }
        println!("Balance: {}", customer.balance);
        println!("Rating: {}", customer.rating);
        if let Some(birth_date) = customer.birth_date {
            println!("Birth Date: {}", birth_date);
        }
        println!("Married: {}", customer.married);
        if let Some(created_at) = customer.created_at {
            println!("Created At: {}", created_at);
        }
    }

    demo::register_user(&db, "admin", "admin")?;
    let username = "admin' --";
    let password = "salah";
    report_login("concatenated", demo::login_concatenated(&db, username, password)?);
    report_login("bound", demo::login(&db, username, password)?);

    demo::register_user(&db, "eko'; DROP TABLE user; --", "eko")?;
    println!("success insert new user");

    let id = demo::add_comment(&db, "eko@gmail.com", "test komen")?;
    println!("success insert new comment with id {}", id);

    for id in demo::add_comments_prepared(&db, 10)? {
        println!("Comment Id {}", id);
    }

    let before = demo::count_comments(&db)?;
    let rolled_back = demo::add_comments_then_rollback(&db, 10)?;
    let after = demo::count_comments(&db)?;
    println!(
        "rolled back {} comments; comment count {} -> {}",
        rolled_back.len(),
        before,
        after
    );

    db.close()
}

fn report_login(path: &str, outcome: Option<String>) {
    match outcome {
        Some(user) => println!("[{}] Sukses login {}", path, user),
        None => println!("[{}] Gagal login", path),
    }
}
