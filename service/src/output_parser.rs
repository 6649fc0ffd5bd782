use std::sync::OnceLock;

use chrono::NaiveDateTime;
use domain::{
    error::ParseError,
    model::vo::{Column, ColumnKind, Layout, ParsedRow, RecordShape, Value},
};
use regex::Regex;

/// Rows parsed from command output, plus the lines that fit the column
/// structure but held values of the wrong type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub rows: Vec<ParsedRow>,
    pub rejected: Vec<ParseError>,
}

impl ParseOutcome {
    pub fn rows(&self) -> &[ParsedRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ParsedRow> {
        self.rows
    }

    /// Fails when every line that fit the shape was rejected. Output with
    /// no data lines at all is not an error.
    pub fn checked(self) -> Result<Self, ParseError> {
        match self.rejected.first() {
            Some(e) if self.rows.is_empty() => Err(e.clone()),
            _ => Ok(self),
        }
    }

    /// Fails on the first rejected line, if any.
    pub fn into_rows_strict(self) -> Result<Vec<ParsedRow>, ParseError> {
        match self.rejected.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(self.rows),
        }
    }
}

fn ruler() -> &'static Regex {
    static RULER: OnceLock<Regex> = OnceLock::new();
    RULER.get_or_init(|| Regex::new(r"^[\s=-]+$").unwrap())
}

fn token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\S+").unwrap())
}

/// Parses every line of `text` against `shape`.
///
/// Blank lines, ruler lines and lines whose token count doesn't fit the shape
/// are headers or banners and are skipped. Lines that fit but can't be
/// coerced end up in [`ParseOutcome::rejected`].
pub fn parse(text: &str, shape: &RecordShape) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || ruler().is_match(trimmed) {
            continue;
        }
        if shape.skip_prefixes.iter().any(|p| trimmed.starts_with(p.as_str())) {
            continue;
        }
        let Some(cells) = split_line(line, shape) else {
            continue;
        };

        match coerce_row(index + 1, &cells, shape) {
            Ok(row) => outcome.rows.push(row),
            Err(reason) => {
                tracing::debug!(line = index + 1, "Rejected output line: {reason}");
                outcome.rejected.push(ParseError {
                    line: index + 1,
                    text: line.to_owned(),
                    reason,
                });
            }
        }
    }

    outcome
}

/// Groups tokens into one cell per column, or `None` if the count doesn't fit.
fn split_line(line: &str, shape: &RecordShape) -> Option<Vec<String>> {
    let (min, max) = shape.token_count();

    let tokens: Vec<(usize, &str)> = match shape.layout {
        Layout::Whitespace => token()
            .find_iter(line)
            .map(|m| (m.start(), m.as_str()))
            .collect(),
        Layout::Delimited(delimiter) => {
            let mut offset = 0;
            line.split(delimiter)
                .map(|part| {
                    let start = offset;
                    offset += part.len() + delimiter.len_utf8();
                    (start, part.trim())
                })
                .collect()
        }
    };
    if tokens.len() < min || max.is_some_and(|max| tokens.len() != max) {
        return None;
    }

    let mut cells = Vec::with_capacity(shape.columns.len());
    let mut next = 0;
    for column in &shape.columns {
        if column.remainder {
            let start = tokens[next].0;
            cells.push(line[start..].trim().to_owned());
            break;
        }
        let joined = tokens[next..next + column.span]
            .iter()
            .map(|(_, t)| *t)
            .collect::<Vec<_>>()
            .join(" ");
        cells.push(joined);
        next += column.span;
    }
    Some(cells)
}

fn coerce_row(line: usize, cells: &[String], shape: &RecordShape) -> Result<ParsedRow, String> {
    let mut row = ParsedRow::new(line);
    for (column, cell) in shape.columns.iter().zip(cells) {
        let value = coerce(cell, column.kind)
            .map_err(|e| format!("column `{}` value `{cell}`: {e}", column.name))?;
        row.push(column.name.clone(), value);
    }
    Ok(row)
}

fn coerce(cell: &str, kind: ColumnKind) -> Result<Value, String> {
    if cell == "--" || (cell == "-" && kind != ColumnKind::Text) {
        return Ok(Value::Missing);
    }

    let number = || cell.replace(',', "");
    Ok(match kind {
        ColumnKind::Text => Value::Text(cell.to_owned()),
        ColumnKind::Integer => Value::Integer(number().parse().map_err(|e| format!("{e}"))?),
        ColumnKind::Float => Value::Float(number().parse().map_err(|e| format!("{e}"))?),
        ColumnKind::Percent => Value::Float(
            number()
                .trim_end_matches('%')
                .parse()
                .map_err(|e| format!("{e}"))?,
        ),
        ColumnKind::Timestamp(format) => Value::Timestamp(
            NaiveDateTime::parse_from_str(cell, format).map_err(|e| format!("{e}"))?,
        ),
        ColumnKind::Elapsed => Value::Integer(parse_elapsed(cell)?),
    })
}

/// `HH:MM` or `HH:MM:SS` to seconds.
fn parse_elapsed(cell: &str) -> Result<i64, String> {
    let parts = cell
        .split(':')
        .map(|p| p.parse::<i64>().map_err(|e| format!("{e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let (hours, minutes, seconds) = match parts[..] {
        [hours, minutes] => (hours, minutes, 0),
        [hours, minutes, seconds] => (hours, minutes, seconds),
        _ => return Err("expected HH:MM or HH:MM:SS".to_owned()),
    };
    hours
        .checked_mul(3600)
        .and_then(|s| s.checked_add(minutes.checked_mul(60)?))
        .and_then(|s| s.checked_add(seconds))
        .ok_or_else(|| "duration out of range".to_owned())
}

/// Built-in shapes for the commands the client runs.
pub mod shapes {
    use super::{Column, ColumnKind, RecordShape};

    /// `ls -l --time-style=long-iso`
    pub fn directory_listing() -> RecordShape {
        RecordShape::whitespace(vec![
            Column::text("permissions"),
            Column::new("links", ColumnKind::Integer),
            Column::text("owner"),
            Column::text("group"),
            Column::new("size", ColumnKind::Integer),
            Column::new("modified", ColumnKind::Timestamp("%Y-%m-%d %H:%M")).span(2),
            Column::text("name").remainder(),
        ])
        .skip_prefix("total")
    }

    /// `qstat -u <user>`, with or without `-x`.
    pub fn job_status() -> RecordShape {
        RecordShape::whitespace(vec![
            Column::text("job_id"),
            Column::text("username"),
            Column::text("queue"),
            Column::text("jobname"),
            Column::text("session_id"),
            Column::new("nds", ColumnKind::Integer),
            Column::new("tsk", ColumnKind::Integer),
            Column::text("requested_memory"),
            Column::new("requested_time", ColumnKind::Elapsed),
            Column::text("status"),
            Column::new("elapsed_time", ColumnKind::Elapsed),
        ])
        .skip_prefix("Job ID")
    }

    /// `show_usage`
    pub fn usage() -> RecordShape {
        RecordShape::whitespace(vec![
            Column::text("system"),
            Column::text("subproject"),
            Column::new("hours_allocated", ColumnKind::Float),
            Column::new("hours_used", ColumnKind::Float),
            Column::new("hours_remaining", ColumnKind::Float),
            Column::new("percent_remaining", ColumnKind::Percent),
            Column::new("background_hours_used", ColumnKind::Float),
        ])
        .skip_prefix("System")
    }

    /// `qstat -Q`
    pub fn queue_summary() -> RecordShape {
        let count = |name| Column::new(name, ColumnKind::Integer);
        RecordShape::whitespace(vec![
            Column::text("queue"),
            count("max"),
            count("total"),
            Column::text("enabled"),
            Column::text("started"),
            count("queued"),
            count("running"),
            count("held"),
            count("waiting"),
            count("transit"),
            count("exiting"),
            Column::text("type"),
        ])
        .skip_prefix("Queue")
    }
}

/// Parses `qstat -f` output into one row per `Job Id:` block.
///
/// Each row starts with `job_id`, followed by the block's attributes as text
/// in source order. Lines indented with a tab continue the previous value.
pub fn parse_full_status(text: &str) -> Vec<ParsedRow> {
    let mut jobs: Vec<ParsedRow> = Vec::new();
    let mut current: Option<(String, String)> = None;

    let flush = |job: Option<&mut ParsedRow>, attr: Option<(String, String)>| {
        if let (Some(job), Some((key, value))) = (job, attr) {
            job.push(key, Value::Text(value));
        }
    };

    for (index, line) in text.lines().enumerate() {
        if let Some(id) = line.strip_prefix("Job Id:") {
            flush(jobs.last_mut(), current.take());
            let mut job = ParsedRow::new(index + 1);
            job.push("job_id", Value::Text(id.trim().to_owned()));
            jobs.push(job);
            continue;
        }
        if jobs.is_empty() || line.trim().is_empty() {
            continue;
        }

        match line.trim().split_once(" = ") {
            Some((key, value)) if !line.starts_with('\t') || current.is_none() => {
                flush(jobs.last_mut(), current.take());
                current = Some((key.trim().to_owned(), value.trim().to_owned()));
            }
            _ => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(line.trim());
                }
            }
        }
    }
    flush(jobs.last_mut(), current.take());

    jobs
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use domain::model::vo::{Column, ColumnKind, RecordShape, Value};
    use indoc::indoc;

    use super::{parse, parse_full_status, shapes};

    const QSTAT: &str = indoc! {"
        pbs01:
                                                                    Req'd  Req'd   Elap
        Job ID          Username Queue    Jobname    SessID NDS TSK Memory Time  S Time
        --------------- -------- -------- ---------- ------ --- --- ------ ----- - -----
        7001.pbs01      user1    standard test1        1234   1  44    --  01:00 R 00:05
        7002.pbs01      user1    debug    test2          --   x  44    --  00:30 Q   --
        7003.pbs01      user1    debug    test3          --   2  88    --  00:30 Q   --
    "};

    #[test]
    fn job_status_skips_banner_and_rejects_bad_line() {
        let outcome = parse(QSTAT, &shapes::job_status());

        assert_eq!(2, outcome.rows.len());
        assert_eq!(1, outcome.rejected.len());
        assert_eq!(6, outcome.rejected[0].line);
        assert!(outcome.rejected[0].reason.contains("nds"));

        let first = &outcome.rows[0];
        assert_eq!(5, first.line);
        assert_eq!(Some("7001.pbs01"), first.text("job_id"));
        assert_eq!(Some(&Value::Integer(44)), first.get("tsk"));
        assert_eq!(Some(&Value::Missing), first.get("requested_memory"));
        assert_eq!(Some(&Value::Integer(3600)), first.get("requested_time"));
        assert_eq!(Some(&Value::Integer(300)), first.get("elapsed_time"));
        assert_eq!(Some(&Value::Missing), outcome.rows[1].get("elapsed_time"));

        assert!(outcome.clone().into_rows_strict().is_err());
        assert!(outcome.clone().checked().is_ok());
        assert_eq!(2, outcome.into_rows().len());
    }

    #[test]
    fn overflowing_elapsed_time_rejects_the_line() {
        let text = indoc! {"
            7001.pbs01      user1    standard test1        1234   1  44    --  9999999999999999:00 R 00:05
            7002.pbs01      user1    debug    test2          --   1  44    --  00:30 Q   --
        "};
        let outcome = parse(text, &shapes::job_status());

        assert_eq!(1, outcome.rows.len());
        assert_eq!(1, outcome.rejected[0].line);
        assert!(outcome.rejected[0].reason.contains("requested_time"));
    }

    #[test]
    fn all_lines_rejected_fails_the_parse() {
        let text = indoc! {"
            7001.pbs01      user1    standard test1        1234   x  y    --  01:00 R 00:05
            7002.pbs01      user1    debug    test2          --   x  y    --  00:30 Q   --
        "};
        let error = parse(text, &shapes::job_status()).checked().unwrap_err();
        assert_eq!(1, error.line);

        assert!(parse("", &shapes::job_status()).checked().unwrap().rows.is_empty());
    }

    #[test]
    fn usage_report() {
        let text = indoc! {"
            Fiscal Year 2024 Hours Report for user1 on narwhal as of 2024-05-01 10:00:00
            System     Subproject     Hours Allocated   Hours Used   Hours Remaining  Percent Remaining  Background Hours Used
            ---------- -------------- ----------------- ------------ ---------------- ----------------- ---------------------
            narwhal    ARLAP12345678  100,000           1234.5       98765.5          98.77%            0.00
        "};
        let rows = parse(text, &shapes::usage()).into_rows_strict().unwrap();

        assert_eq!(1, rows.len());
        assert_eq!(Some("ARLAP12345678"), rows[0].text("subproject"));
        assert_eq!(Some(&Value::Float(100000.0)), rows[0].get("hours_allocated"));
        assert_eq!(Some(&Value::Float(98.77)), rows[0].get("percent_remaining"));
    }

    #[test]
    fn directory_listing_keeps_names_with_spaces() {
        let text = indoc! {"
            total 8
            drwxr-xr-x 2 user1 users 4096 2024-05-01 10:15 input files
            -rw-r--r-- 1 user1 users  120 2024-04-30 09:00 run.pbs
        "};
        let rows = parse(text, &shapes::directory_listing())
            .into_rows_strict()
            .unwrap();

        assert_eq!(2, rows.len());
        assert_eq!(Some("input files"), rows[0].text("name"));
        let modified = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();
        assert_eq!(Some(&Value::Timestamp(modified)), rows[0].get("modified"));
        assert_eq!(Some(&Value::Integer(120)), rows[1].get("size"));
    }

    #[test]
    fn queue_summary() {
        let text = indoc! {"
            Queue              Max   Tot Ena Str   Que   Run   Hld   Wat   Trn   Ext Type
            ---------------- ----- ----- --- --- ----- ----- ----- ----- ----- ----- ----
            standard             0    12 yes yes     3     9     0     0     0     0 Exec
            debug                0     1 yes yes     0     1     0     0     0     0 Exec
        "};
        let rows = parse(text, &shapes::queue_summary()).into_rows_strict().unwrap();

        let queues = rows.iter().filter_map(|r| r.text("queue")).collect::<Vec<_>>();
        assert_eq!(vec!["standard", "debug"], queues);
        assert_eq!(Some(&Value::Integer(9)), rows[0].get("running"));
    }

    #[test]
    fn delimited_layout() {
        let shape = RecordShape::delimited(
            '|',
            vec![
                Column::text("name"),
                Column::new("count", ColumnKind::Integer),
                Column::text("note").remainder(),
            ],
        );
        let rows = parse("a | 3 | x|y\nb|-|z\nonly|one\n", &shape).into_rows_strict().unwrap();

        assert_eq!(2, rows.len());
        assert_eq!(Some("x|y"), rows[0].text("note"));
        assert_eq!(Some(&Value::Missing), rows[1].get("count"));
    }

    #[test]
    fn full_status_blocks() {
        let text = "Job Id: 7001.pbs01\n    Job_Name = test1\n    job_state = R\n    \
                    Variable_List = PBS_O_HOME=/home/user1,PBS_O_LANG=en_US.UTF-8,\n\
                    \tPBS_O_SHELL=/bin/bash\n\nJob Id: 7002.pbs01\n    Job_Name = test2\n";
        let jobs = parse_full_status(text);

        assert_eq!(2, jobs.len());
        assert_eq!(Some("7001.pbs01"), jobs[0].text("job_id"));
        assert_eq!(Some("R"), jobs[0].text("job_state"));
        assert_eq!(
            Some("PBS_O_HOME=/home/user1,PBS_O_LANG=en_US.UTF-8,PBS_O_SHELL=/bin/bash"),
            jobs[0].text("Variable_List")
        );
        assert_eq!(Some("test2"), jobs[1].text("Job_Name"));
        assert_eq!(7, jobs[1].line);
    }
}
