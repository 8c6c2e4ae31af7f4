/// A raw response the decoder benchmarks run against.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    framing: Framing,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, framing: Framing, file: TestFile) -> Self {
        Self { name, framing, file }
    }

    pub fn length(name: &'static str, file: TestFile) -> Self {
        Self::new(name, Framing::Length, file)
    }

    pub fn chunked(name: &'static str, file: TestFile) -> Self {
        Self::new(name, Framing::Chunked, file)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

/// How the body of a [`TestCase`] is delimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    Length,
    Chunked,
}
