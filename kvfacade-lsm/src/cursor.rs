use kvfacade_core::StatusCode;

pub(crate) struct LsmCursor {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl LsmCursor {
    pub(crate) fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        LsmCursor { entries: entries.into_iter(), current: None }
    }
}

impl kvfacade_core::Cursor for LsmCursor {
    fn next(&mut self) -> StatusCode {
        self.current = self.entries.next();
        if self.current.is_some() {
            StatusCode::Ok
        } else {
            StatusCode::NotFound
        }
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_slice()).unwrap_or(&[])
    }
}
