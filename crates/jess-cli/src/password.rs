//! Interactive password entry.
//!
//! Registers the process-wide password callbacks: creation prompts twice
//! and enforces the strength estimate against the envelope's minimum
//! security level, retrieval prompts once.

use jess_core::{
    calculate_password_security_level, set_password_callbacks, JessError, Signet,
};

/// Installs interactive password prompts as the process-wide callbacks.
pub fn install_password_prompts() {
    set_password_callbacks(Box::new(create_password), Box::new(get_password));
}

fn prompt_label(signet: &Signet) -> String {
    match &signet.info {
        Some(info) if !info.name.is_empty() => format!("password \"{}\"", info.name),
        _ if !signet.id.is_empty() => format!("password [{}]", signet.id),
        _ => "password".to_string(),
    }
}

fn create_password(signet: &mut Signet, min_security_level: i32) -> Result<(), JessError> {
    let label = prompt_label(signet);
    loop {
        let password = rpassword::prompt_password(format!("Enter new {label}: "))?;
        if password.is_empty() {
            eprintln!("Password must not be empty.");
            continue;
        }

        // Iterations are unknown here; rate the password alone and let the
        // session compiler do the final check with the real parameters.
        let level = calculate_password_security_level(&password, 1);
        if level < 0 {
            eprintln!("Password is exceptionally weak, please choose another one.");
            continue;
        }
        if min_security_level > 0 && level < min_security_level {
            eprintln!(
                "Password rates at {level} bits, need at least {min_security_level}. Please choose a stronger one."
            );
            continue;
        }

        let repeated = rpassword::prompt_password(format!("Repeat new {label}: "))?;
        if password != repeated {
            eprintln!("Passwords do not match, try again.");
            continue;
        }

        signet.key = password.into_bytes();
        return Ok(());
    }
}

fn get_password(signet: &mut Signet) -> Result<(), JessError> {
    let label = prompt_label(signet);
    let password = rpassword::prompt_password(format!("Enter {label}: "))?;
    if password.is_empty() {
        return Err(JessError::PasswordUnavailable { id: signet.id.clone() });
    }
    signet.key = password.into_bytes();
    Ok(())
}
