#[rocket::launch]
fn rocket() -> _ {
    let rocket = contacts_api::rocket();
    log::info!("starting contacts API server");
    rocket
}
