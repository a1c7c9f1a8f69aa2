fn main() -> anyhow::Result<()> {
    handfield::logging::init();
    handfield::cli::run()
}
