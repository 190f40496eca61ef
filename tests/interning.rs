//! Cross-construction interning behavior of a shared pool.

use std::sync::Arc;
use std::thread;

use uri_pool::{PathStyle, UriPool};

#[test]
fn all_construction_paths_share_one_instance() {
    let pool = UriPool::with_path_style(PathStyle::Posix);

    let parsed = pool.parse("file:/tmp/data/model.bin").unwrap();
    let from_path = pool.file_uri("/tmp/data/model.bin");
    let from_components =
        pool.hierarchical(Some("file"), None, None, true, &["tmp", "data", "model.bin"], None)
            .unwrap();

    assert_eq!(parsed, from_path);
    assert_eq!(parsed, from_components);

    let platform = pool.parse("platform:/resource/proj/f.txt").unwrap();
    assert_eq!(platform, pool.platform_resource("/proj/f.txt", true));
    assert_eq!(platform, pool.platform_resource("proj/f.txt", false));
}

#[test]
fn component_strings_survive_their_first_owner() {
    let pool = UriPool::new();

    let first = pool.parse("http://host/kept/x").unwrap();
    let kept: Arc<str> = first.segments()[0].clone();
    drop(first);

    // The segment string is still owned here, so the next URI that needs
    // it gets the same instance.
    let second = pool.parse("http://host/kept/y").unwrap();
    assert!(Arc::ptr_eq(&kept, &second.segments()[0]));
}

#[test]
fn query_replacement_round_trips() {
    let pool = UriPool::new();
    let base = pool.parse("platform:/resource/p/f?rev=1").unwrap();
    let stripped = pool.with_query(&base, None).unwrap();
    assert_eq!(stripped.as_str(), "platform:/resource/p/f");
    let restored = pool.with_query(&stripped, Some("rev=1")).unwrap();
    assert_eq!(restored, base);
}

#[test]
fn uris_work_as_map_keys() {
    use std::collections::HashMap;

    let pool = UriPool::with_path_style(PathStyle::Posix);
    let mut map = HashMap::new();
    map.insert(pool.parse("http://host/a").unwrap(), 1);
    map.insert(pool.parse("http://host/b").unwrap(), 2);

    assert_eq!(map[&pool.parse("http://host/a").unwrap()], 1);

    // A path-constructed URI finds the entry its parsed twin put there.
    map.insert(pool.parse("file:/tmp/k").unwrap(), 3);
    assert_eq!(map[&pool.file_uri("/tmp/k")], 3);
}

#[test]
fn separate_pools_never_share() {
    let a = UriPool::new();
    let b = UriPool::new();
    let from_a = a.parse("http://host/p").unwrap();
    let from_b = b.parse("http://host/p").unwrap();
    assert_ne!(from_a, from_b);
    assert_eq!(from_a.as_str(), from_b.as_str());
}

#[test]
fn concurrent_construction_converges() {
    let pool = Arc::new(UriPool::with_path_style(PathStyle::Posix));
    let inputs = ["http://host/p/q", "platform:/resource/p/f", "file:/tmp/x", "a/b?q"];

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                inputs.iter().map(|s| pool.parse(s).unwrap()).collect::<Vec<_>>()
            })
        })
        .collect();

    let all: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &all[1..] {
        assert_eq!(result, &all[0]);
    }

    // Path-based construction joins the same instances.
    let file = pool.file_uri("/tmp/x");
    assert_eq!(file, all[0][2]);
}
