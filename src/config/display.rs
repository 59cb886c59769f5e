//! Startup pretty-printer. Purely cosmetic — never consulted by the router.

use std::fmt;

use crate::config::raw::{RawRoute, RawServer};

impl fmt::Display for RawServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  \x1b[38;5;244m{}\x1b[0m", "-".repeat(47))?;
        writeln!(
            f,
            "  \x1b[1;34m*\x1b[0m \x1b[1;37mnetwork:\x1b[0m   \x1b[32m{}\x1b[0m \x1b[38;5;244mvia ports\x1b[0m \x1b[1;32m{:?}\x1b[0m",
            self.host, self.ports
        )?;
        writeln!(f, "  \x1b[1;34m*\x1b[0m \x1b[1;37midentity:\x1b[0m  \x1b[36m{}\x1b[0m", self.server_name)?;
        writeln!(
            f,
            "  \x1b[1;34m*\x1b[0m \x1b[1;37mdefault:\x1b[0m   \x1b[{}m{}\x1b[0m",
            if self.default_server { "32" } else { "31" },
            if self.default_server { "yes" } else { "no" }
        )?;
        writeln!(
            f,
            "  \x1b[1;34m*\x1b[0m \x1b[1;37mbody limit:\x1b[0m \x1b[33m{} KB\x1b[0m",
            self.client_max_body_size / 1024
        )?;
        if let Some(page) = &self.error_page {
            writeln!(f, "  \x1b[1;34m*\x1b[0m \x1b[1;37merror page:\x1b[0m \x1b[31m{}\x1b[0m", page)?;
        }

        writeln!(f, "\n  \x1b[1;37mrouting table ({})\x1b[0m", self.routes.len())?;
        writeln!(f, "  \x1b[38;5;244m{}\x1b[0m", "-".repeat(47))?;

        let mut routes = self.routes.clone();
        routes.sort_by(|a, b| a.path.cmp(&b.path));
        for (idx, route) in routes.iter().enumerate() {
            let is_last = idx == routes.len() - 1;
            let branch = if is_last { "  `--" } else { "  |--" };
            writeln!(f, "  \x1b[38;5;244m{}\x1b[0m \x1b[1;37m{}\x1b[0m", branch, route.path)?;
            route.fmt_details(f, is_last)?;
        }
        Ok(())
    }
}

impl RawRoute {
    pub(crate) fn fmt_details(&self, f: &mut fmt::Formatter<'_>, is_last_route: bool) -> fmt::Result {
        let indent = if is_last_route { "     " } else { "  |  " };
        writeln!(
            f,
            "  \x1b[38;5;250m{}methods:\x1b[0m \x1b[48;5;236m\x1b[38;5;250m {}\x1b[0m",
            indent,
            self.methods.join(" | ")
        )?;
        writeln!(f, "  \x1b[38;5;250m{}root:\x1b[0m    \x1b[32m{}\x1b[0m", indent, self.root)?;
        writeln!(f, "  \x1b[38;5;250m{}index:\x1b[0m   \x1b[36m{}\x1b[0m", indent, self.index)?;
        writeln!(
            f,
            "  \x1b[38;5;250m{}autoindex:\x1b[0m \x1b[{}m{}\x1b[0m",
            indent,
            if self.autoindex { "32" } else { "31" },
            if self.autoindex { "on" } else { "off" }
        )?;
        if let Some(redir) = &self.redirection {
            writeln!(f, "  \x1b[38;5;250m{}redirect:\x1b[0m \x1b[35m{}\x1b[0m", indent, redir)?;
        }
        if let Some(upload) = &self.upload_path {
            writeln!(f, "  \x1b[38;5;250m{}upload:\x1b[0m   \x1b[33m{}\x1b[0m", indent, upload)?;
        }
        if let Some(cgi) = &self.cgi_ext {
            writeln!(f, "  \x1b[38;5;250m{}cgi:\x1b[0m      \x1b[38;5;208m{}\x1b[0m", indent, cgi)?;
        }
        Ok(())
    }
}

pub fn display_config(configs: &[RawServer]) {
    println!("\n\x1b[1;35mserver configuration\x1b[0m");
    println!("\x1b[38;5;240m{}\x1b[0m", "=".repeat(64));
    for (i, server) in configs.iter().enumerate() {
        println!("\n  \x1b[1;37mserver block {:02}\x1b[0m", i + 1);
        print!("{}", server);
    }
    println!("\x1b[38;5;240m{}\x1b[0m", "=".repeat(64));
}
