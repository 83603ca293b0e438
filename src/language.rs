//! Static language profile table.
//!
//! Command templates use `{dir}` for the session's work directory inside
//! the sandbox. Wire identifiers 0-5 are fixed by the intake protocol.

use std::fmt;

/// A supported submission language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C11,
    Cpp17,
    Java8,
    Python3,
    CSharp,
    Ruby,
}

/// How one language is compiled and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    /// Extension of the staged source file `Main.<ext>`.
    pub extension: &'static str,
    /// Compile command, or syntax check when `check_only` is set.
    pub compile: &'static str,
    /// The compile command produces nothing to run; it only validates.
    pub check_only: bool,
    /// Artifact file name relative to the work directory.
    pub artifact: &'static str,
    /// Run command, before the timeout and stdin wrapping.
    pub run: &'static str,
}

const C11: LanguageProfile = LanguageProfile {
    extension: "c",
    compile: "gcc {dir}/Main.c -lm -std=gnu11 -o {dir}/Main.out",
    check_only: false,
    artifact: "Main.out",
    run: "{dir}/Main.out",
};

const CPP17: LanguageProfile = LanguageProfile {
    extension: "cpp",
    compile: "g++ {dir}/Main.cpp -lm -std=gnu++17 -o {dir}/Main.out",
    check_only: false,
    artifact: "Main.out",
    run: "{dir}/Main.out",
};

const JAVA8: LanguageProfile = LanguageProfile {
    extension: "java",
    compile: "javac {dir}/Main.java -d {dir}",
    check_only: false,
    artifact: "Main.class",
    run: "java -cp {dir} Main",
};

const PYTHON3: LanguageProfile = LanguageProfile {
    extension: "py",
    compile: "python3 -m py_compile {dir}/Main.py",
    check_only: true,
    artifact: "Main.py",
    run: "python3 {dir}/Main.py",
};

const CSHARP: LanguageProfile = LanguageProfile {
    extension: "cs",
    compile: "mcs {dir}/Main.cs -out:{dir}/Main.exe",
    check_only: false,
    artifact: "Main.exe",
    run: "mono {dir}/Main.exe",
};

const RUBY: LanguageProfile = LanguageProfile {
    extension: "rb",
    compile: "ruby -cw {dir}/Main.rb",
    check_only: true,
    artifact: "Main.rb",
    run: "ruby {dir}/Main.rb",
};

impl Language {
    pub const ALL: [Self; 6] = [
        Self::C11,
        Self::Cpp17,
        Self::Java8,
        Self::Python3,
        Self::CSharp,
        Self::Ruby,
    ];

    /// Look up a language by its wire identifier.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub const fn profile(self) -> &'static LanguageProfile {
        match self {
            Self::C11 => &C11,
            Self::Cpp17 => &CPP17,
            Self::Java8 => &JAVA8,
            Self::Python3 => &PYTHON3,
            Self::CSharp => &CSHARP,
            Self::Ruby => &RUBY,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::C11 => "C11",
            Self::Cpp17 => "C++17",
            Self::Java8 => "Java8",
            Self::Python3 => "Python3",
            Self::CSharp => "C#",
            Self::Ruby => "Ruby",
        };
        f.write_str(name)
    }
}

impl LanguageProfile {
    pub fn source_path(&self, work_dir: &str) -> String {
        format!("{work_dir}/Main.{}", self.extension)
    }

    pub fn artifact_path(&self, work_dir: &str) -> String {
        format!("{work_dir}/{}", self.artifact)
    }

    pub fn compile_command(&self, work_dir: &str) -> String {
        self.compile.replace("{dir}", work_dir)
    }

    /// The supervised run command: kill timeout around the program, test
    /// input on stdin.
    pub fn run_command(&self, work_dir: &str, timeout_seconds: u64) -> String {
        format!(
            "timeout {timeout_seconds} {} < {work_dir}/testcase.txt",
            self.run.replace("{dir}", work_dir)
        )
    }
}
