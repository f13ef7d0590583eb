//! The two halves of the bridge: wire traffic becomes mesh publishes, and
//! mesh publishes become wire traffic.

pub(crate) mod mesh_to_wire;
pub(crate) mod wire_to_mesh;
