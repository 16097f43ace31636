// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static libraries linked into the Python extension modules.

use {
    super::{Builder, SourcePackage},
    crate::{
        project_layout::Project,
        shell::{run, Command},
    },
    anyhow::Result,
    buildpy_common::fs::set_executable,
    log::info,
};

/// OpenSSL, for `_ssl` and `_hashlib`.
#[derive(Clone, Debug)]
pub struct OpensslBuilder {
    package: SourcePackage,
    project: Project,
}

impl OpensslBuilder {
    pub fn new(project: Project) -> Self {
        Self {
            package: SourcePackage::new(
                "openssl",
                "1.1.1w",
                "https://github.com/openssl/openssl.git",
                "openssl-{ver}.tar.gz",
                "https://www.openssl.org/source/old/1.1.1/{archive}",
                &["libssl.a", "libcrypto.a"],
            ),
            project,
        }
    }
}

impl Builder for OpensslBuilder {
    fn package(&self) -> &SourcePackage {
        &self.package
    }

    fn project(&self) -> &Project {
        &self.project
    }

    fn build(&self) -> Result<()> {
        if self.lib_products_exist() {
            return Ok(());
        }

        let src_dir = self.src_dir();
        info!("configuring {}...", self.package.name);
        run(
            &Command::Args(vec![
                "./config".to_string(),
                "no-shared".to_string(),
                "no-tests".to_string(),
                format!("--prefix={}", self.prefix().display()),
            ]),
            &src_dir,
        )?;

        info!("building {}...", self.package.name);
        run(&Command::args(["make", "install_sw"]), &src_dir)?;
        info!("{} build complete", self.package.name);

        Ok(())
    }
}

/// bzip2, for `_bz2`.
#[derive(Clone, Debug)]
pub struct Bzip2Builder {
    package: SourcePackage,
    project: Project,
}

impl Bzip2Builder {
    pub fn new(project: Project) -> Self {
        Self {
            package: SourcePackage::new(
                "bzip2",
                "1.0.8",
                "https://github.com/libarchive/bzip2.git",
                "bzip2-{ver}.tar.gz",
                "https://sourceware.org/pub/bzip2/{archive}",
                &["libbz2.a"],
            ),
            project,
        }
    }
}

impl Builder for Bzip2Builder {
    fn package(&self) -> &SourcePackage {
        &self.package
    }

    fn project(&self) -> &Project {
        &self.project
    }

    fn build(&self) -> Result<()> {
        if self.lib_products_exist() {
            return Ok(());
        }

        run(
            &Command::Args(vec![
                "make".to_string(),
                "install".to_string(),
                format!("PREFIX={}", self.prefix().display()),
                "CFLAGS=-fPIC".to_string(),
            ]),
            &self.src_dir(),
        )
    }
}

/// xz, for `_lzma`.
#[derive(Clone, Debug)]
pub struct XzBuilder {
    package: SourcePackage,
    project: Project,
}

impl XzBuilder {
    pub fn new(project: Project) -> Self {
        Self {
            package: SourcePackage::new(
                "xz",
                "5.8.2",
                "https://github.com/tukaani-project/xz.git",
                "xz-{ver}.tar.gz",
                "https://github.com/tukaani-project/xz/releases/download/v{ver}/xz-{ver}.tar.gz",
                &["liblzma.a"],
            ),
            project,
        }
    }

    /// Arguments of the `configure` invocation.
    pub fn configure_args(&self) -> Vec<String> {
        let mut args = [
            "/bin/sh",
            "configure",
            "--disable-dependency-tracking",
            "--disable-xzdec",
            "--disable-lzmadec",
            "--disable-nls",
            "--enable-small",
            "--disable-shared",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
        args.push(format!("--prefix={}", self.prefix().display()));

        args
    }
}

impl Builder for XzBuilder {
    fn package(&self) -> &SourcePackage {
        &self.package
    }

    fn project(&self) -> &Project {
        &self.project
    }

    fn build(&self) -> Result<()> {
        if self.lib_products_exist() {
            return Ok(());
        }

        let src_dir = self.src_dir();

        // Release tarballs do not always carry the executable bit.
        for script in [
            src_dir.join("configure"),
            src_dir.join("build-aux").join("install-sh"),
        ] {
            set_executable(&script, 0o755)?;
        }

        run(&Command::Args(self.configure_args()), &src_dir)?;
        run(&Command::args(["make"]), &src_dir)?;
        run(&Command::args(["make", "install"]), &src_dir)
    }
}

/// Every library CPython is built against.
pub fn python_dependencies(project: &Project) -> Vec<Box<dyn Builder>> {
    vec![
        Box::new(OpensslBuilder::new(project.clone())),
        Box::new(Bzip2Builder::new(project.clone())),
        Box::new(XzBuilder::new(project.clone())),
    ]
}
