use shared_types::typescript_gen::API_TYPE_NAMES;
use std::fs;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = shared_types::generate_typescript_definitions(API_TYPE_NAMES)?;

    let output_dir = Path::new("ui/api-types");
    fs::create_dir_all(output_dir)?;

    let output_path = output_dir.join("types.ts");
    fs::write(&output_path, format!("{}\n", output))?;
    println!("Generated TypeScript types in {}", output_path.display());

    Ok(())
}
