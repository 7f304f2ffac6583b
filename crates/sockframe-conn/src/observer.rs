/// Half-close notification hooks.
///
/// Each hook is invoked at most once per connection lifetime, on the
/// completion queue, when its direction closes for any reason (explicit
/// close, transport error, end-of-stream, or teardown), whether or not a
/// request was in flight at the time.
#[derive(Default)]
pub struct ConnectionObserver {
    pub on_read_closed: Option<Box<dyn FnOnce() + Send>>,
    pub on_write_closed: Option<Box<dyn FnOnce() + Send>>,
}

impl ConnectionObserver {
    /// Set the hook invoked when the read direction closes.
    pub fn with_read_closed(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_read_closed = Some(Box::new(hook));
        self
    }

    /// Set the hook invoked when the write direction closes.
    pub fn with_write_closed(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_write_closed = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for ConnectionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionObserver")
            .field("on_read_closed", &self.on_read_closed.is_some())
            .field("on_write_closed", &self.on_write_closed.is_some())
            .finish()
    }
}
