//! Wrapper tipis untuk API editor yang dipakai daemon

use super::client::Client;
use crate::error::{Error, Result};
use crate::protocol::{Arg, FormatError, FromValue, Value};

/// Directives untuk list argumen scalar, dipisah koma
fn directives(args: &[Arg]) -> std::result::Result<String, FormatError> {
    let mut fmt = String::with_capacity(args.len() * 2);
    for (i, arg) in args.iter().enumerate() {
        let directive = arg.directive().ok_or(FormatError::ArgumentType {
            directive: '!',
            expected: "scalar argument",
            found: arg.kind_name(),
        })?;
        if i > 0 {
            fmt.push(',');
        }
        fmt.push(directive);
    }
    Ok(fmt)
}

impl Client {
    /// `:command`
    pub fn command(&self, command: &str) -> Result<()> {
        self.call_expect::<Value>("nvim_command", "s", vec![Arg::from(command)])
            .map(|_| ())
    }

    pub fn eval(&self, expr: &str) -> Result<Option<Value>> {
        self.call_expect("nvim_eval", "s", vec![Arg::from(expr)])
    }

    /// Global variable `g:name`
    pub fn get_var<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        self.call_expect("nvim_get_var", "s", vec![Arg::from(name)])
    }

    pub fn set_var(&self, name: &str, value: Arg) -> Result<()> {
        let fmt = format!("s,{}", directives(std::slice::from_ref(&value))?);
        self.call_expect::<Value>("nvim_set_var", &fmt, vec![Arg::from(name), value])
            .map(|_| ())
    }

    pub fn get_option<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        self.call_expect("nvim_get_option", "s", vec![Arg::from(name)])
    }

    /// Panggil VimL function `name(args...)`
    pub fn call_function<T: FromValue>(&self, name: &str, args: Vec<Arg>) -> Result<Option<T>> {
        let fmt = format!("s,[!{}]", directives(&args)?);
        self.call_expect(
            "nvim_call_function",
            &fmt,
            vec![Arg::from(name), Arg::Forward(args)],
        )
    }

    pub fn subscribe(&self, event: &str) -> Result<()> {
        self.call_expect::<Value>("nvim_subscribe", "s", vec![Arg::from(event)])
            .map(|_| ())
    }

    /// Returns `true` jika editor menerima attach
    pub fn buf_attach(&self, bufnr: i64, send_buffer: bool) -> Result<bool> {
        let attached = self.call_expect::<bool>(
            "nvim_buf_attach",
            "d,b,{}",
            vec![Arg::Int(bufnr), Arg::Bool(send_buffer)],
        )?;
        Ok(attached.unwrap_or(false))
    }

    pub fn buf_get_lines(&self, bufnr: i64, start: i64, end: i64) -> Result<Option<Vec<String>>> {
        self.call_expect(
            "nvim_buf_get_lines",
            "d,l,l,b",
            vec![Arg::Int(bufnr), Arg::Int(start), Arg::Int(end), Arg::Bool(false)],
        )
    }

    /// Returns namespace id yang dipakai editor
    pub fn buf_add_highlight(
        &self,
        bufnr: i64,
        namespace: i64,
        group: &str,
        line: i64,
        col_start: i64,
        col_end: i64,
    ) -> Result<Option<i64>> {
        self.call_expect(
            "nvim_buf_add_highlight",
            "dd,s,ddd",
            vec![
                Arg::Int(bufnr),
                Arg::Int(namespace),
                Arg::from(group),
                Arg::Int(line),
                Arg::Int(col_start),
                Arg::Int(col_end),
            ],
        )
    }

    pub fn buf_clear_namespace(
        &self,
        bufnr: i64,
        namespace: i64,
        line_start: i64,
        line_end: i64,
    ) -> Result<()> {
        self.call_expect::<Value>(
            "nvim_buf_clear_namespace",
            "dddd",
            vec![
                Arg::Int(bufnr),
                Arg::Int(namespace),
                Arg::Int(line_start),
                Arg::Int(line_end),
            ],
        )
        .map(|_| ())
    }

    /// Daftarkan client ke editor. Fire-and-forget.
    pub fn set_client_info(&self, name: &str, version: (u64, u64, u64), kind: &str) -> Result<()> {
        self.notify(
            "nvim_set_client_info",
            "s,{s:u,s:u,s:u},s,{},{}",
            vec![
                Arg::from(name),
                Arg::from("major"),
                Arg::UInt(version.0),
                Arg::from("minor"),
                Arg::UInt(version.1),
                Arg::from("patch"),
                Arg::UInt(version.2),
                Arg::from(kind),
            ],
        )
    }

    /// `[channel_id, metadata]`
    pub fn get_api_info(&self) -> Result<(u64, Value)> {
        let info: Vec<Value> = self
            .call_expect("nvim_get_api_info", "", Vec::new())?
            .ok_or_else(|| Error::protocol("nvim_get_api_info returned no value"))?;
        let mut info = info.into_iter();
        let channel = info
            .next()
            .ok_or_else(|| Error::protocol("api info is empty"))?
            .try_expect::<u64>()?;
        Ok((channel, info.next().unwrap_or_default()))
    }
}
