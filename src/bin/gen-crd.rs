use kube::CustomResourceExt;
use reitti::crd::canary::Canary;
use reitti::crd::httpproxy::HTTPProxy;

fn main() -> anyhow::Result<()> {
    // Emit the Canary and HTTPProxy CRDs as a JSON array
    // Use: cargo run --bin gen-crd | python3 -c "import sys,json,yaml; print(yaml.dump(json.load(sys.stdin), default_flow_style=False))"
    // to convert to YAML
    let crds = vec![
        serde_json::to_value(Canary::crd())?,
        serde_json::to_value(HTTPProxy::crd())?,
    ];

    println!("{}", serde_json::to_string_pretty(&crds)?);
    Ok(())
}
