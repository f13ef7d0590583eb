//! Regex-based filter compilation and DNS label matching.

use crate::config::Config;
use trust_dns_client::op::Message as DnsMessage;

#[derive(Debug, Error)]
pub enum FilterError {
	#[error("AllowFilter and DenyFilter are mutually exclusive")]
	MutuallyExclusive,

	#[error("invalid pattern {pattern:?}: {source}")]
	Pattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},
}

/// Compiled regexes derived from [`Config`], plus the allow/deny polarity.
///
/// Never partially populated: [`compile`] either returns a fully compiled
/// `CompiledFilters` or an error, never a half-built one.
#[derive(Debug, Default)]
pub struct CompiledFilters {
	pub(crate) port_regexes: Vec<regex::Regex>,
	pub(crate) label_regexes: Vec<regex::Regex>,
	pub(crate) deny_mode: bool,
}

pub(crate) fn compile(config: &Config) -> Result<CompiledFilters, FilterError> {
	if !config.allow_filter.is_empty() && !config.deny_filter.is_empty() {
		return Err(FilterError::MutuallyExclusive);
	}

	let deny_mode = !config.deny_filter.is_empty();
	let label_patterns = if deny_mode { &config.deny_filter } else { &config.allow_filter };

	Ok(CompiledFilters {
		port_regexes: compile_patterns(&config.port_filter)?,
		label_regexes: compile_patterns(label_patterns)?,
		deny_mode,
	})
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<regex::Regex>, FilterError> {
	patterns
		.iter()
		.map(|pattern| regex::Regex::new(pattern).map_err(|source| FilterError::Pattern { pattern: pattern.clone(), source }))
		.collect()
}

/// True iff some regex in `regexes` matches the trailing-dot-stripped name
/// of some question or answer in `msg`.
pub(crate) fn label_match(msg: &DnsMessage, regexes: &[regex::Regex]) -> bool {
	if regexes.is_empty() {
		return false;
	}

	names(msg).any(|name| regexes.iter().any(|regex| regex.is_match(&name)))
}

fn names(msg: &DnsMessage) -> impl Iterator<Item = String> + '_ {
	msg.queries()
		.iter()
		.map(|query| query.name().to_utf8())
		.chain(msg.answers().iter().map(|answer| answer.name().to_utf8()))
		.map(|name| name.strip_suffix('.').map(str::to_owned).unwrap_or(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterDecision {
	Keep,
	Discard,
}

/// The filter decision:
/// - deny mode, label matched  => discard
/// - allow mode, filters non-empty, label did not match => discard
/// - otherwise => keep
pub(crate) fn decide(filters: &CompiledFilters, msg: &DnsMessage) -> FilterDecision {
	let matched = label_match(msg, &filters.label_regexes);

	let discard = if filters.deny_mode {
		matched
	} else {
		!filters.label_regexes.is_empty() && !matched
	};

	if discard {
		FilterDecision::Discard
	} else {
		FilterDecision::Keep
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use trust_dns_client::op::Query as DnsQuery;
	use trust_dns_client::rr::{IntoName, RecordType};

	fn message_with_query_name(name: &str) -> DnsMessage {
		let mut msg = DnsMessage::new();
		let mut query = DnsQuery::new();
		query.set_name(name.into_name().unwrap());
		query.set_query_type(RecordType::PTR);
		msg.add_query(query);
		msg
	}

	#[test]
	fn label_match_strips_trailing_dot() {
		let msg = message_with_query_name("_ipp._tcp.local.");
		let regexes = compile_patterns(&[r"_ipp\._tcp\.local$".to_string()]).unwrap();
		assert!(label_match(&msg, &regexes));
	}

	#[test]
	fn label_match_false_when_nothing_matches() {
		let msg = message_with_query_name("_http._tcp.local.");
		let regexes = compile_patterns(&[r"_ipp\._tcp".to_string()]).unwrap();
		assert!(!label_match(&msg, &regexes));
	}

	#[test]
	fn compile_rejects_allow_and_deny_together() {
		let mut config = Config::test_default();
		config.allow_filter = vec!["a".into()];
		config.deny_filter = vec!["b".into()];
		assert!(matches!(compile(&config), Err(FilterError::MutuallyExclusive)));
	}

	#[test]
	fn compile_reports_offending_pattern() {
		let mut config = Config::test_default();
		config.allow_filter = vec!["(unterminated".into()];
		let err = compile(&config).unwrap_err();
		assert!(matches!(err, FilterError::Pattern { pattern, .. } if pattern == "(unterminated"));
	}

	#[test]
	fn deny_list_drops_matching_label() {
		let mut config = Config::test_default();
		config.deny_filter = vec![r"_googlecast\._tcp".to_string()];
		let filters = compile(&config).unwrap();

		let cast = message_with_query_name("_googlecast._tcp.local.");
		assert_eq!(decide(&filters, &cast), FilterDecision::Discard);

		let ipp = message_with_query_name("_ipp._tcp.local.");
		assert_eq!(decide(&filters, &ipp), FilterDecision::Keep);
	}

	#[test]
	fn allow_list_keeps_only_matching_label() {
		let mut config = Config::test_default();
		config.allow_filter = vec![r"_ipp\._tcp".to_string()];
		let filters = compile(&config).unwrap();

		let ipp = message_with_query_name("_ipp._tcp.local.");
		assert_eq!(decide(&filters, &ipp), FilterDecision::Keep);

		let http = message_with_query_name("_http._tcp.local.");
		assert_eq!(decide(&filters, &http), FilterDecision::Discard);
	}

	#[test]
	fn empty_filters_keep_everything() {
		let config = Config::test_default();
		let filters = compile(&config).unwrap();
		let msg = message_with_query_name("_anything._tcp.local.");
		assert_eq!(decide(&filters, &msg), FilterDecision::Keep);
	}

	#[test]
	fn parse_failure_is_filtered_as_empty_message() {
		// On parse failure the pipeline filters an empty `Message::new()`. Deny-mode
		// instances forward it (no label can match nothing); allow-mode drops it.
		let empty = DnsMessage::new();

		let mut deny_config = Config::test_default();
		deny_config.deny_filter = vec![r"_googlecast\._tcp".to_string()];
		let deny_filters = compile(&deny_config).unwrap();
		assert_eq!(decide(&deny_filters, &empty), FilterDecision::Keep);

		let mut allow_config = Config::test_default();
		allow_config.allow_filter = vec![r"_ipp\._tcp".to_string()];
		let allow_filters = compile(&allow_config).unwrap();
		assert_eq!(decide(&allow_filters, &empty), FilterDecision::Discard);
	}
}
