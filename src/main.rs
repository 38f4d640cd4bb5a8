#[tokio::main]
async fn main() -> anyhow::Result<()> {
    printer_service_crm::run().await
}
