fn main() -> anyhow::Result<()> {
    brandbuild::run()
}
