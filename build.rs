// build.rs

use std::env;

fn main() -> anyhow::Result<()> {
    let api_port = env::var("API_PORT").unwrap_or_else(|_| "3000".into());
    let api_url = env::var("PLANT_ID_API_URL")
        .unwrap_or_else(|_| "https://plant.id/api/v3/health_assessment".into());

    println!("cargo:rustc-env=API_PORT={api_port}");
    println!("cargo:rustc-env=PLANT_ID_API_URL={api_url}");
    println!("cargo:rerun-if-env-changed=API_PORT");
    println!("cargo:rerun-if-env-changed=PLANT_ID_API_URL");

    Ok(())
}

// EOF
