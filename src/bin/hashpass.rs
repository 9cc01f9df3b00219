//! Prints an Argon2 hash for a password. With a username it prints a
//! ready-to-run insert for bootstrapping the first studio account:
//!
//! `hashpass <password> [username] [admin|employee]`

use argon2::{Argon2, PasswordHasher};
use argon2::password_hash::{SaltString, rand_core::OsRng};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(password) = args.next() else {
        anyhow::bail!("Usage: hashpass <password> [username] [admin|employee]");
    };

    let salt = SaltString::generate(&mut OsRng);
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash error: {e}"))?
        .to_string();

    match args.next() {
        None => println!("{phc}"),
        Some(username) => {
            let role = args.next().unwrap_or_else(|| "admin".to_string());
            if role != "admin" && role != "employee" {
                anyhow::bail!("role must be admin or employee, got {role}");
            }
            let username = username.replace('\'', "''");
            println!(
                "INSERT INTO studio_user (username, display_name, password_hash, role) \
                 VALUES ('{username}', '{username}', '{phc}', '{role}');"
            );
        }
    }
    Ok(())
}
