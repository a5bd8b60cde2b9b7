use mt_core::MtApp;

/// Router state of the REST routes.
pub struct MtAxumState<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub app: MtApp<R, P>,
}

impl<R, P> Clone for MtAxumState<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self { app: self.app.clone() }
    }
}

impl<R, P> MtAxumState<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new(app: MtApp<R, P>) -> Self {
        Self { app }
    }
}
