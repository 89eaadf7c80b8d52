//! Prints an Argon2 PHC hash for seeding `app_user.password_hash`.

use appointment_server::auth::hash_password;

fn main() -> anyhow::Result<()> {
    let Some(password) = std::env::args().nth(1) else {
        anyhow::bail!("Usage: hashpass <password>");
    };
    let phc = hash_password(&password).map_err(|e| anyhow::anyhow!("argon2 hash error: {e}"))?;
    println!("{phc}");
    Ok(())
}
