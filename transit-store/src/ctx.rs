/// Carried through every repository call so request-scoped concerns
/// (auth, tracing) have somewhere to live without repositories reaching
/// into thread-locals. Mirrors the teacher's `&Ctx` parameter threaded
/// through every `XxxBmcTrait` method; this system has no end-user
/// authentication of its own, so `Anonymous` is the only variant today.
#[derive(Debug, Clone, Default)]
pub enum Ctx {
    #[default]
    Anonymous,
}

impl Ctx {
    pub fn anonymous() -> Self {
        Ctx::Anonymous
    }
}
