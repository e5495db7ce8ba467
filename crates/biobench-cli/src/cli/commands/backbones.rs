use crate::exit_codes::EXIT_SUCCESS;
use biobench_core::BackboneRegistry;

pub fn run() -> anyhow::Result<i32> {
    let registry = BackboneRegistry::with_builtins()?;
    for name in registry.list_names() {
        println!("{name}");
    }
    Ok(EXIT_SUCCESS)
}
