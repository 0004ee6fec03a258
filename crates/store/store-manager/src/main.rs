//! Placeholder for the cluster-manager collaborator: the process that
//! would assign keys to shards and route clients to the owner holding
//! each shard's region. Out of scope here — this store is a single
//! region with a single owner — and kept only as a named seam for a
//! multi-region deployment to grow into.

fn main() {
    eprintln!("store-manager is not implemented; this store runs as a single region");
}
