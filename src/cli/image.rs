use anyhow::{Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use registry_client::{Descriptor, RegistryClient, RegistryTransport};

/// Check whether an image reference exists. Returns false when it does not.
pub async fn exists<T: RegistryTransport>(client: &RegistryClient<T>, image: &str) -> Result<bool> {
    let found = client
        .ref_exists(image)
        .await
        .with_context(|| format!("Failed to check whether {} exists", image))?;

    println!("{}", found);
    Ok(found)
}

/// Show the descriptor of an image reference
pub async fn head<T: RegistryTransport>(
    client: &RegistryClient<T>,
    image: &str,
    json: bool,
) -> Result<()> {
    let descriptor = client
        .head(image)
        .await
        .with_context(|| format!("Failed to get descriptor for {}", image))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
    } else {
        println!("{}", descriptor_table(image, &descriptor));
    }
    Ok(())
}

/// Print the image configuration as JSON
pub async fn inspect<T: RegistryTransport>(client: &RegistryClient<T>, image: &str) -> Result<()> {
    let config = client
        .inspect(image)
        .await
        .with_context(|| format!("Failed to inspect {}", image))?;

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn retag<T: RegistryTransport>(
    client: &RegistryClient<T>,
    existing: &str,
    new: &str,
) -> Result<()> {
    client
        .retag(existing, new)
        .await
        .with_context(|| format!("Failed to tag {} as {}", existing, new))?;

    println!("✓ Tagged '{}' as '{}'", existing, new);
    Ok(())
}

fn descriptor_table(image: &str, descriptor: &Descriptor) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("IMAGE").add_attribute(Attribute::Bold),
            Cell::new("DIGEST").add_attribute(Attribute::Bold),
            Cell::new("MEDIA TYPE").add_attribute(Attribute::Bold),
            Cell::new("SIZE").add_attribute(Attribute::Bold),
        ]);

    table.add_row(vec![
        Cell::new(image),
        Cell::new(&descriptor.digest),
        Cell::new(&descriptor.media_type),
        Cell::new(descriptor.size),
    ]);
    table
}
