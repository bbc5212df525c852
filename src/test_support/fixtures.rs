//! Version banners captured from real compilers.

/// `gcc --version` on Fedora 39.
pub const GCC_13: &str = "gcc (GCC) 13.2.1 20230801\n\
Copyright (C) 2023 Free Software Foundation, Inc.\n\
This is free software; see the source for copying conditions.  There is NO\n\
warranty; not even for MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.\n";

/// `gcc --version` on Ubuntu 20.04, below the supported minimum.
pub const GCC_9: &str = "gcc (Ubuntu 9.4.0-1ubuntu1~20.04.2) 9.4.0\n\
Copyright (C) 2019 Free Software Foundation, Inc.\n";

/// `clang --version` from an upstream LLVM release.
pub const CLANG_17: &str = "clang version 17.0.6\n\
Target: x86_64-pc-linux-gnu\n\
Thread model: posix\n\
InstalledDir: /usr/bin\n";

/// `clang-cl --version` on Windows.
pub const CLANG_CL_18: &str = "clang version 18.1.8\n\
Target: x86_64-pc-windows-msvc\n\
Thread model: posix\n\
InstalledDir: C:\\Program Files\\LLVM\\bin\n";

/// Banner `cl.exe` prints on stderr when run without arguments.
pub const MSVC_19_40: &str = "Microsoft (R) C/C++ Optimizing Compiler Version 19.40.33807 for x64\n\
Copyright (C) Microsoft Corporation.  All rights reserved.\n\
\n\
usage: cl [ option... ] filename... [ /link linkoption... ]\n";

/// Output of something that is not a compiler at all.
pub const NOT_A_COMPILER: &str = "usage: frobnicate [--verbose] <file>\n";
