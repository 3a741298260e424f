#[rocket::launch]
fn rocket() -> _ {
    let rocket = clinic_api::rocket();
    log::info!("starting clinic API server");
    rocket
}
