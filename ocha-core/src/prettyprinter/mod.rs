use pretty::RcDoc;

pub mod ocha;

pub trait PrettyPrint {
    fn to_doc(&self) -> RcDoc<'_, ()>;

    fn to_pretty(&self) -> String {
        self.to_doc()
            .pretty(usize::MAX) // in principle, the pretty printer could do different things at different widths
            .to_string()
    }
}

/// Space-separated list.
pub fn spaced<'a, T: 'a + PrettyPrint>(ts: impl IntoIterator<Item = &'a T>) -> RcDoc<'a, ()> {
    RcDoc::intersperse(ts.into_iter().map(PrettyPrint::to_doc), RcDoc::space())
}

/// Wraps a document in parentheses.
pub fn parens(doc: RcDoc<'_, ()>) -> RcDoc<'_, ()> {
    RcDoc::text("(").append(doc).append(RcDoc::text(")"))
}

impl<T: PrettyPrint> PrettyPrint for Vec<T> {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        spaced(self)
    }
}
