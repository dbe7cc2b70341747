#[cfg(test)]
mod tests {
    use cellar_macros::test_traced;
    use tracing::{debug, error, info, trace};

    #[test_traced(level = "INFO")]
    fn test_info_level() {
        info!("This is an info log");
        debug!("This is a debug log (won't be shown)");
        assert_eq!(2 + 2, 4);
    }

    #[test_traced]
    fn test_default_level() {
        debug!("This is a debug log");
        assert_eq!(3 * 3, 9);
    }

    #[test_traced(level = "error")]
    fn test_lowercase_level() {
        error!("This is an error log");
        assert_eq!(5 * 2, 10);
    }

    #[test_traced(level = "TRACE")]
    fn test_returns_value() -> Result<(), String> {
        trace!(value = 7, "returning from a traced test");
        Ok(())
    }

    #[test_traced]
    #[should_panic(expected = "traced panic")]
    fn test_should_panic() {
        panic!("traced panic");
    }
}
