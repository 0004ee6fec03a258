//! Placeholder for the topology collaborator: the process that would
//! track which owner and reader processes are attached to which
//! regions across a cluster. Out of scope here — this store assumes a
//! single owner and readers discovering the region by a well-known
//! path or shared-memory name — and kept only as a named seam for a
//! multi-region deployment to grow into.

fn main() {
    eprintln!("store-topology is not implemented; readers locate the region by name or path directly");
}
