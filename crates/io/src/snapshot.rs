// Snapshot format using SQLite

use std::path::Path;

use rusqlite::{params, Connection};
use rustc_hash::FxHashMap;

use cellgraph_engine::addr::{Address, AddressMode};
use cellgraph_engine::graph::GraphParts;
use cellgraph_engine::handle::RefHandle;
use cellgraph_engine::range::Range;
use cellgraph_engine::value::RawValue;

use crate::{CacheError, CACHE_FORMAT_VERSION};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS worksheets (
    pos INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS addrs (
    id INTEGER PRIMARY KEY,
    dir TEXT NOT NULL,
    workbook TEXT NOT NULL,
    worksheet TEXT NOT NULL,
    row INTEGER NOT NULL,
    col INTEGER NOT NULL,
    mode INTEGER NOT NULL          -- 0=absolute, 1=relative
);

CREATE TABLE IF NOT EXISTS ranges (
    id INTEGER PRIMARY KEY,
    dir TEXT NOT NULL,
    workbook TEXT NOT NULL,
    worksheet TEXT NOT NULL,
    top_row INTEGER NOT NULL,
    left_col INTEGER NOT NULL,
    bottom_row INTEGER NOT NULL,
    right_col INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS formulas (
    addr_id INTEGER PRIMARY KEY,
    text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cell_values (
    addr_id INTEGER PRIMARY KEY,
    value_type INTEGER NOT NULL,   -- 1=number, 2=text
    value_num REAL,
    value_text TEXT
);

CREATE TABLE IF NOT EXISTS cell_handles (
    addr_id INTEGER PRIMARY KEY,
    handle TEXT NOT NULL           -- JSON
);

CREATE TABLE IF NOT EXISTS range_handles (
    range_id INTEGER PRIMARY KEY,
    handle TEXT NOT NULL           -- JSON
);

CREATE TABLE IF NOT EXISTS f2v (
    formula_id INTEGER NOT NULL,
    range_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS f2i (
    formula_id INTEGER NOT NULL,
    input_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS v2i (
    range_id INTEGER NOT NULL,
    cell_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS perturb (
    range_id INTEGER PRIMARY KEY,
    frozen INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS weights (
    addr_id INTEGER PRIMARY KEY,
    weight INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS distances (
    from_id INTEGER NOT NULL,
    to_id INTEGER NOT NULL,
    lengths TEXT NOT NULL          -- JSON array of path lengths
);
"#;

const TYPE_NUMBER: i64 = 1;
const TYPE_TEXT: i64 = 2;

fn mode_to_int(mode: AddressMode) -> i64 {
    match mode {
        AddressMode::Absolute => 0,
        AddressMode::Relative => 1,
    }
}

fn mode_from_int(mode: i64) -> AddressMode {
    if mode == 1 {
        AddressMode::Relative
    } else {
        AddressMode::Absolute
    }
}

/// Write flattened graph parts to a fresh snapshot at `path`.
pub fn save(parts: &GraphParts, path: &Path) -> Result<(), CacheError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    for (key, value) in [
        ("format_version", CACHE_FORMAT_VERSION.to_string()),
        ("workbook", parts.workbook.clone()),
        ("dir", parts.dir.clone()),
        ("analysis_millis", parts.analysis_millis.to_string()),
    ] {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    for (pos, name) in parts.worksheets.iter().enumerate() {
        conn.execute(
            "INSERT INTO worksheets (pos, name) VALUES (?1, ?2)",
            params![pos as i64, name],
        )?;
    }

    // Assign dense ids to every distinct address and range.
    let mut addr_ids: FxHashMap<&Address, i64> = FxHashMap::default();
    let mut range_ids: FxHashMap<&Range, i64> = FxHashMap::default();
    let addr_iter = parts
        .formulas
        .iter()
        .map(|(a, _)| a)
        .chain(parts.values.iter().map(|(a, _)| a))
        .chain(parts.cell_handles.iter().map(|(a, _)| a))
        .chain(parts.f2v.iter().map(|(a, _)| a))
        .chain(parts.f2i.iter().flat_map(|(a, b)| [a, b]))
        .chain(parts.v2i.iter().map(|(_, a)| a))
        .chain(parts.weights.iter().map(|(a, _)| a))
        .chain(parts.distances.iter().flat_map(|(a, b, _)| [a, b]));
    for a in addr_iter {
        let next = addr_ids.len() as i64;
        addr_ids.entry(a).or_insert(next);
    }
    let range_iter = parts
        .vector_handles
        .iter()
        .map(|(r, _)| r)
        .chain(parts.f2v.iter().map(|(_, r)| r))
        .chain(parts.v2i.iter().map(|(r, _)| r))
        .chain(parts.do_not_perturb.iter().map(|(r, _)| r));
    for r in range_iter {
        let next = range_ids.len() as i64;
        range_ids.entry(r).or_insert(next);
    }

    conn.execute("BEGIN TRANSACTION", [])?;
    {
        let mut stmt = conn.prepare(
            "INSERT INTO addrs (id, dir, workbook, worksheet, row, col, mode) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (a, id) in &addr_ids {
            stmt.execute(params![
                id,
                a.dir,
                a.workbook,
                a.worksheet,
                a.row as i64,
                a.col as i64,
                mode_to_int(a.mode)
            ])?;
        }

        let mut stmt = conn.prepare(
            "INSERT INTO ranges (id, dir, workbook, worksheet, top_row, left_col, bottom_row, right_col) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (r, id) in &range_ids {
            stmt.execute(params![
                id,
                r.dir,
                r.workbook,
                r.worksheet,
                r.top as i64,
                r.left as i64,
                r.bottom as i64,
                r.right as i64
            ])?;
        }

        let mut stmt = conn.prepare("INSERT INTO formulas (addr_id, text) VALUES (?1, ?2)")?;
        for (a, text) in &parts.formulas {
            stmt.execute(params![addr_ids[a], text])?;
        }

        let mut stmt = conn.prepare(
            "INSERT INTO cell_values (addr_id, value_type, value_num, value_text) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (a, value) in &parts.values {
            let (value_type, num, text): (i64, Option<f64>, Option<&str>) = match value {
                RawValue::Number(n) => (TYPE_NUMBER, Some(*n), None),
                RawValue::Text(s) => (TYPE_TEXT, None, Some(s)),
            };
            stmt.execute(params![addr_ids[a], value_type, num, text])?;
        }

        let mut stmt =
            conn.prepare("INSERT INTO cell_handles (addr_id, handle) VALUES (?1, ?2)")?;
        for (a, handle) in &parts.cell_handles {
            stmt.execute(params![addr_ids[a], serde_json::to_string(handle)?])?;
        }

        let mut stmt =
            conn.prepare("INSERT INTO range_handles (range_id, handle) VALUES (?1, ?2)")?;
        for (r, handle) in &parts.vector_handles {
            stmt.execute(params![range_ids[r], serde_json::to_string(handle)?])?;
        }

        let mut stmt = conn.prepare("INSERT INTO f2v (formula_id, range_id) VALUES (?1, ?2)")?;
        for (f, r) in &parts.f2v {
            stmt.execute(params![addr_ids[f], range_ids[r]])?;
        }

        let mut stmt = conn.prepare("INSERT INTO f2i (formula_id, input_id) VALUES (?1, ?2)")?;
        for (f, i) in &parts.f2i {
            stmt.execute(params![addr_ids[f], addr_ids[i]])?;
        }

        let mut stmt = conn.prepare("INSERT INTO v2i (range_id, cell_id) VALUES (?1, ?2)")?;
        for (r, c) in &parts.v2i {
            stmt.execute(params![range_ids[r], addr_ids[c]])?;
        }

        let mut stmt = conn.prepare("INSERT INTO perturb (range_id, frozen) VALUES (?1, ?2)")?;
        for (r, frozen) in &parts.do_not_perturb {
            stmt.execute(params![range_ids[r], *frozen as i64])?;
        }

        let mut stmt = conn.prepare("INSERT INTO weights (addr_id, weight) VALUES (?1, ?2)")?;
        for (a, w) in &parts.weights {
            stmt.execute(params![addr_ids[a], *w as i64])?;
        }

        let mut stmt = conn.prepare(
            "INSERT INTO distances (from_id, to_id, lengths) VALUES (?1, ?2, ?3)",
        )?;
        for (from, to, lengths) in &parts.distances {
            stmt.execute(params![
                addr_ids[from],
                addr_ids[to],
                serde_json::to_string(lengths)?
            ])?;
        }
    }
    conn.execute("COMMIT", [])?;

    Ok(())
}

/// Read flattened graph parts back from a snapshot.
///
/// The format version in the file's meta table is checked before anything
/// else; a mismatch fails with [`CacheError::VersionMismatch`] so callers
/// can fall back to a rebuild.
pub fn load(path: &Path) -> Result<GraphParts, CacheError> {
    let conn = Connection::open(path)?;

    let version: String = conn.query_row(
        "SELECT value FROM meta WHERE key = 'format_version'",
        [],
        |row| row.get(0),
    )?;
    let found: u32 = version.parse().unwrap_or(0);
    if found != CACHE_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            found,
            expected: CACHE_FORMAT_VERSION,
        });
    }

    let mut parts = GraphParts {
        workbook: conn.query_row(
            "SELECT value FROM meta WHERE key = 'workbook'",
            [],
            |row| row.get(0),
        )?,
        dir: conn.query_row("SELECT value FROM meta WHERE key = 'dir'", [], |row| {
            row.get(0)
        })?,
        ..Default::default()
    };
    let millis: String = conn.query_row(
        "SELECT value FROM meta WHERE key = 'analysis_millis'",
        [],
        |row| row.get(0),
    )?;
    parts.analysis_millis = millis.parse().unwrap_or(0);

    let mut stmt = conn.prepare("SELECT name FROM worksheets ORDER BY pos")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    for name in rows {
        parts.worksheets.push(name?);
    }

    let mut addrs: FxHashMap<i64, Address> = FxHashMap::default();
    let mut stmt =
        conn.prepare("SELECT id, dir, workbook, worksheet, row, col, mode FROM addrs")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            Address::new(
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)? as u32,
                row.get::<_, i64>(5)? as u32,
                mode_from_int(row.get::<_, i64>(6)?),
            ),
        ))
    })?;
    for entry in rows {
        let (id, addr) = entry?;
        addrs.insert(id, addr);
    }

    let mut ranges: FxHashMap<i64, Range> = FxHashMap::default();
    let mut stmt = conn
        .prepare("SELECT id, dir, workbook, worksheet, top_row, left_col, bottom_row, right_col FROM ranges")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            Range::new(
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)? as u32,
                row.get::<_, i64>(5)? as u32,
                row.get::<_, i64>(6)? as u32,
                row.get::<_, i64>(7)? as u32,
            ),
        ))
    })?;
    for entry in rows {
        let (id, range) = entry?;
        ranges.insert(id, range);
    }

    let mut stmt = conn.prepare("SELECT addr_id, text FROM formulas")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for entry in rows {
        let (id, text) = entry?;
        parts.formulas.push((addrs[&id].clone(), text));
    }

    let mut stmt =
        conn.prepare("SELECT addr_id, value_type, value_num, value_text FROM cell_values")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<f64>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    for entry in rows {
        let (id, value_type, num, text) = entry?;
        let value = if value_type == TYPE_NUMBER {
            RawValue::Number(num.unwrap_or(0.0))
        } else {
            RawValue::Text(text.unwrap_or_default())
        };
        parts.values.push((addrs[&id].clone(), value));
    }

    let mut stmt = conn.prepare("SELECT addr_id, handle FROM cell_handles")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for entry in rows {
        let (id, json) = entry?;
        let handle: RefHandle = serde_json::from_str(&json)?;
        parts.cell_handles.push((addrs[&id].clone(), handle));
    }

    let mut stmt = conn.prepare("SELECT range_id, handle FROM range_handles")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for entry in rows {
        let (id, json) = entry?;
        let handle: RefHandle = serde_json::from_str(&json)?;
        parts.vector_handles.push((ranges[&id].clone(), handle));
    }

    let mut stmt = conn.prepare("SELECT formula_id, range_id FROM f2v")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for entry in rows {
        let (f, r) = entry?;
        parts.f2v.push((addrs[&f].clone(), ranges[&r].clone()));
    }

    let mut stmt = conn.prepare("SELECT formula_id, input_id FROM f2i")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for entry in rows {
        let (f, i) = entry?;
        parts.f2i.push((addrs[&f].clone(), addrs[&i].clone()));
    }

    let mut stmt = conn.prepare("SELECT range_id, cell_id FROM v2i")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for entry in rows {
        let (r, c) = entry?;
        parts.v2i.push((ranges[&r].clone(), addrs[&c].clone()));
    }

    let mut stmt = conn.prepare("SELECT range_id, frozen FROM perturb")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for entry in rows {
        let (r, frozen) = entry?;
        parts.do_not_perturb.push((ranges[&r].clone(), frozen != 0));
    }

    let mut stmt = conn.prepare("SELECT addr_id, weight FROM weights")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for entry in rows {
        let (a, w) = entry?;
        parts.weights.push((addrs[&a].clone(), w as i32));
    }

    let mut stmt = conn.prepare("SELECT from_id, to_id, lengths FROM distances")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for entry in rows {
        let (from, to, json) = entry?;
        let lengths: Vec<u32> = serde_json::from_str(&json)?;
        parts
            .distances
            .push((addrs[&from].clone(), addrs[&to].clone(), lengths));
    }

    Ok(parts)
}
