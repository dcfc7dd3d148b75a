//! Prints the CustomResourceDefinitions served by the fleet controller.
//!
//! `cargo run -p crds --bin crdgen > config/crd/bases/infra.bale.dev.yaml`

use crds::{Bale, Turtle};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [Bale::crd(), Turtle::crd()];
    for crd in &crds {
        print!("---\n{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
