use kube::CustomResourceExt;
use lazarus::crd::restore_test::RestoreTest;

fn main() -> anyhow::Result<()> {
    // Print the RestoreTest CRD as JSON.
    // Use: cargo run --bin gen-crd | python3 -c "import sys,json,yaml; print(yaml.dump(json.load(sys.stdin), default_flow_style=False))"
    // to convert to YAML
    let crd = RestoreTest::crd();
    println!("{}", serde_json::to_string_pretty(&crd)?);
    Ok(())
}
