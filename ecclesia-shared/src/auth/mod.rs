/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the password policy
/// - [`token`]: Random session ids and verification tokens, hashed for storage
/// - [`session`]: Database-backed session store
/// - [`scope`]: Maps an identity to the members it may see
/// - [`authorization`]: Role requirements and member management rules
/// - [`middleware`]: Axum session and require-auth layers
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::auth::password::{hash_password, verify_password};
/// use ecclesia_shared::auth::token::generate_verification_token;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Harvest2024")?;
/// assert!(verify_password("Harvest2024", &hash)?);
///
/// // The token goes into the email, the hash into the users table
/// let (token, token_hash) = generate_verification_token();
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod middleware;
pub mod password;
pub mod scope;
pub mod session;
pub mod token;
