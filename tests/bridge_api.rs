use mdns_mesh_bridge::{envelope::MeshEnvelope, ConfigBuilder};

#[test]
fn config_builder_rejects_conflicting_filters() {
	let err = ConfigBuilder::new()
		.server("tcp://localhost:1883")
		.topic("mdns-mesh")
		.allow_filter(["_ipp._tcp"])
		.deny_filter(["_googlecast._tcp"])
		.build()
		.unwrap_err();

	assert!(err.to_string().contains("mutually exclusive"));
}

#[test]
fn config_builder_requires_a_topic() {
	let err = ConfigBuilder::new().server("tcp://localhost:1883").build().unwrap_err();
	assert!(err.to_string().contains("topic"));
}

#[test]
fn config_builder_rejects_an_unparseable_broker_uri() {
	let err = ConfigBuilder::new().server("not a uri").topic("mdns-mesh").build().unwrap_err();
	assert!(err.to_string().contains("broker URI"));
}

#[test]
fn mesh_envelope_round_trips_across_the_public_api() {
	let envelope = MeshEnvelope::new("bridge-a", vec![1, 2, 3, 4]);
	let wire = envelope.to_bytes();
	let decoded = MeshEnvelope::from_bytes(&wire).unwrap();
	assert_eq!(decoded, envelope);
}
