pub fn handle() {
    println!("nebari {}", env!("CARGO_PKG_VERSION"));
}
