// Argument checks run before any request is sent.

use std::path::Path;
use std::time::Duration;

use super::errors::IrpError;

pub fn non_empty(value: &str, param: &str) -> Result<(), IrpError> {
    if value.trim().is_empty() {
        return Err(IrpError::validation(param, "cannot be empty"));
    }
    Ok(())
}

pub fn positive(value: u64, param: &str) -> Result<(), IrpError> {
    if value == 0 {
        return Err(IrpError::validation(param, "must be positive, got 0"));
    }
    Ok(())
}

pub fn non_empty_list<T>(values: &[T], param: &str) -> Result<(), IrpError> {
    if values.is_empty() {
        return Err(IrpError::validation(param, "cannot be empty"));
    }
    Ok(())
}

pub fn non_zero_duration(value: Duration, param: &str) -> Result<(), IrpError> {
    if value.is_zero() {
        return Err(IrpError::validation(param, "must be greater than zero"));
    }
    Ok(())
}

pub fn file_exists(path: &Path, param: &str) -> Result<(), IrpError> {
    if !path.exists() {
        return Err(IrpError::validation(
            param,
            format!("does not exist: {}", path.display()),
        ));
    }
    if !path.is_file() {
        return Err(IrpError::validation(
            param,
            format!("is not a file: {}", path.display()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_are_rejected() {
        assert!(non_empty("EDM_A", "edm_name").is_ok());
        let err = non_empty("   ", "edm_name").unwrap_err();
        assert_eq!(err.to_string(), "invalid edm_name: cannot be empty");
    }

    #[test]
    fn zero_is_not_positive() {
        assert!(positive(1, "workflow_id").is_ok());
        assert!(positive(0, "workflow_id").is_err());
    }

    #[test]
    fn empty_lists_are_rejected() {
        assert!(non_empty_list(&[1u64], "ids").is_ok());
        assert!(non_empty_list::<u64>(&[], "ids").is_err());
    }

    #[test]
    fn file_checks_distinguish_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("accounts.csv");
        std::fs::write(&file, "ACCNTNUM\n").unwrap();

        assert!(file_exists(&file, "accounts").is_ok());
        assert!(file_exists(dir.path(), "accounts")
            .unwrap_err()
            .to_string()
            .contains("is not a file"));
        assert!(file_exists(&dir.path().join("nope.csv"), "accounts")
            .unwrap_err()
            .to_string()
            .contains("does not exist"));
    }
}
