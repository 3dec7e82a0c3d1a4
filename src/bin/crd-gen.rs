use forge_coordinator::crd::policy::ForgePolicy;
use kube::CustomResourceExt;

fn main() {
    match serde_json::to_string_pretty(&ForgePolicy::crd()) {
        Ok(crd_yaml) => print!("{}", crd_yaml),
        Err(e) => {
            eprintln!("Error serializing CRD: {}", e);
            std::process::exit(1);
        }
    }
}
