use rocket::{Build, Rocket};
use saldo::{Config, build_rocket};

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    dotenvy::dotenv().ok();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    build_rocket(config)
}
