#[tokio::main]
async fn main() -> anyhow::Result<()> {
    adaas_observability::init();

    let matches = adaas_cli::command().get_matches();
    let output = adaas_cli::execute(&matches).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
