use anyhow::Result;

/// Everything in projtrack happens on one thread: toggles, appends and exports are driven by
/// discrete user actions and always run to completion before the next one is accepted.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
