//! Stable per-instance sender identifier, used solely to suppress
//! self-echo: a bridge drops any mesh message whose sender matches its own.

use crate::config::Config;

#[derive(Debug, Error)]
pub enum IdentityError {
	#[error("could not determine a unique id: machine id and hostname lookup both failed")]
	Unavailable,
}

/// Resolution order: `config.unique_id` override, then a stable per-machine
/// id, then the hostname. Fatal if all three fail.
pub(crate) fn resolve(config: &Config) -> Result<String, IdentityError> {
	if let Some(unique_id) = &config.unique_id {
		log::warn!(
			"UniqueID override {unique_id:?} in use: if another bridge on this mesh shares it, \
			 both instances will echo each other's packets indefinitely"
		);
		return Ok(unique_id.clone());
	}

	if let Ok(machine_id) = machine_uid::get() {
		if !machine_id.is_empty() {
			return Ok(machine_id);
		}
	}

	if let Ok(hostname) = hostname::get() {
		if let Ok(hostname) = hostname.into_string() {
			if !hostname.is_empty() {
				return Ok(hostname);
			}
		}
	}

	Err(IdentityError::Unavailable)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unique_id_override_wins() {
		let mut config = Config::test_default();
		config.unique_id = Some("operator-chosen".into());
		assert_eq!(resolve(&config).unwrap(), "operator-chosen");
	}
}
