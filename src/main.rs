#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    let _rocket = channel_mirror::rocket().launch().await?;
    Ok(())
}
