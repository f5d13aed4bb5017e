use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::Render;

pub async fn run(account: Option<&str>) -> Result<()> {
    let connected = super::connect(account).await?;
    println!("{}", connected.session.principal().render());

    if connected.session.supports_scheduling().await? {
        println!("\n{}", "Server supports implicit scheduling (RFC 6638)".green());
    } else {
        println!("\n{}", "Server does not support RFC 6638 scheduling".red());
    }
    Ok(())
}
