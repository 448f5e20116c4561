//! Round-trip tests
//!
//! Parsing the dumper's output must give back the tree it was dumped from.

use ngxconf_parser::{parse, serialize, Config, Style};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Item {
    Leaf {
        name: String,
        params: Vec<String>,
        comment: Option<String>,
        inline: Option<String>,
    },
    Block {
        name: String,
        params: Vec<String>,
        comment: Option<String>,
        children: Vec<Item>,
    },
}

fn param() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9/._:=-]{1,12}",
        "\\$[a-z_]{1,10}",
        "\"[a-z /]{0,10}\"",
        "'[a-z ]{0,10}'",
        "[0-9]{1,4}[kmg]",
    ]
}

fn comment() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("#[a-z ]{0,12}")
}

fn item() -> impl Strategy<Value = Item> {
    // Prefixes keep generated names clear of registered directives
    let leaf = (
        "k_[a-z]{1,8}",
        prop::collection::vec(param(), 0..4),
        comment(),
        comment(),
    )
        .prop_map(|(name, params, comment, inline)| Item::Leaf {
            name,
            params,
            comment,
            inline,
        });
    leaf.prop_recursive(3, 32, 4, |inner| {
        (
            "zz_[a-z]{3,6}",
            prop::collection::vec(param(), 0..3),
            comment(),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(name, params, comment, children)| Item::Block {
                name,
                params,
                comment,
                children,
            })
    })
}

fn render(items: &[Item], out: &mut String) {
    for item in items {
        match item {
            Item::Leaf {
                name,
                params,
                comment,
                inline,
            } => {
                if let Some(c) = comment {
                    out.push_str(c);
                    out.push('\n');
                }
                out.push_str(name);
                for p in params {
                    out.push(' ');
                    out.push_str(p);
                }
                out.push(';');
                if let Some(c) = inline {
                    out.push(' ');
                    out.push_str(c);
                }
                out.push('\n');
            }
            Item::Block {
                name,
                params,
                comment,
                children,
            } => {
                if let Some(c) = comment {
                    out.push_str(c);
                    out.push('\n');
                }
                out.push_str(name);
                for p in params {
                    out.push(' ');
                    out.push_str(p);
                }
                out.push_str(" {\n");
                render(children, out);
                out.push_str("}\n");
            }
        }
    }
}

fn reparse(config: &Config, style: &Style) -> Config {
    let text = serialize(config, style);
    parse(&text).unwrap_or_else(|e| panic!("dumped text does not parse: {}\n{}", e, text))
}

proptest! {
    #[test]
    fn prop_roundtrip_default_style(items in prop::collection::vec(item(), 0..6)) {
        let mut source = String::new();
        render(&items, &mut source);
        let original = parse(&source).unwrap();
        let again = reparse(&original, &Style::default());
        prop_assert!(original.same_structure(&again), "source:\n{}", source);
    }

    #[test]
    fn prop_roundtrip_compact_style(items in prop::collection::vec(item(), 0..6)) {
        let mut source = String::new();
        render(&items, &mut source);
        let original = parse(&source).unwrap();
        let style = Style { starting_indent: 3, ..Style::compact() };
        let again = reparse(&original, &style);
        prop_assert!(original.same_structure(&again));
    }

    #[test]
    fn prop_dump_is_stable(items in prop::collection::vec(item(), 0..6)) {
        let mut source = String::new();
        render(&items, &mut source);
        let once = serialize(&parse(&source).unwrap(), &Style::default());
        let twice = serialize(&parse(&once).unwrap(), &Style::default());
        prop_assert_eq!(once, twice);
    }
}

const REALISTIC: &str = r#"
# Global settings
user www-data;
worker_processes auto;
pid /run/nginx.pid;

events {
    worker_connections 768; # per worker
    multi_accept on;
}

http {
    sendfile on;
    log_format main '$remote_addr - $remote_user [$time_local] "$request"'
        '$status $body_bytes_sent';
    map $http_upgrade $connection_upgrade {
        default upgrade;
        '' close;
    }
    limit_req_zone $binary_remote_addr zone=perip:10m rate=10r/s;
    proxy_cache_path /var/cache/nginx levels=1:2 keys_zone=cache:10m inactive=60m;

    upstream app {
        least_conn;
        server 10.0.0.1:8080 weight=3;
        server 10.0.0.2:8080 backup;
    }

    server {
        listen 443 ssl http2;
        server_name example.com www.example.com;
        ssl_certificate /etc/ssl/example.pem;
        ssl_certificate_key /etc/ssl/example.key;

        location = /health {
            return 200 "ok";
        }

        location ~* \.(css|js)$ {
            expires 30d;
        }

        location / {
            if ($request_method = POST) {
                return 405;
            }
            proxy_pass http://app;
            proxy_set_header Upgrade $http_upgrade;
            content_by_lua_block {
                local t = { "}" }
                ngx.say(#t) -- count
            }
        }
        # end of server
    }
}

stream {
    upstream dns {
        server 10.0.0.53:53;
    }
    server {
        listen 53 udp;
        proxy_pass dns;
    }
}
"#;

#[test]
fn test_realistic_config_roundtrip() {
    let original = parse(REALISTIC).unwrap();
    for style in [Style::default(), Style::compact(), Style::default().with_indent(8)] {
        let again = reparse(&original, &style);
        assert!(original.same_structure(&again));
    }
}

#[test]
fn test_sorted_output_keeps_content() {
    let original = parse(REALISTIC).unwrap();
    let sorted = reparse(&original, &Style::default().sorted());
    assert_eq!(original.len(), sorted.len());
    assert_eq!(
        original.find_directives("server").len(),
        sorted.find_directives("server").len()
    );
}
