//! Request fixtures shared by the benchmarks.

/// A named benchmark input.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    file: TestFile,
}

impl TestCase {
    pub const fn new(name: &'static str, file: TestFile) -> Self {
        Self { name, file }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    /// The request repeated `times` times back to back, as a pipelining client sends it.
    pub fn pipelined(&self, times: usize) -> Vec<u8> {
        self.file.content.as_bytes().repeat(times)
    }
}

/// A raw HTTP request kept under `resources/request`.
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

    /// Offset of the first body byte.
    pub fn head_len(&self) -> usize {
        self.content.find("\r\n\r\n").map_or(self.content.len(), |at| at + 4)
    }
}
