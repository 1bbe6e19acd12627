//! The Hunt-McIlroy candidate algorithm and its output stages.
//!
//! The pipeline hashes each line into an equivalence class, prunes the
//! common prefix and suffix, runs the candidate ("stone") pass to build
//! the match vector J (J[i] = matching line of file 2, 0 = none),
//! re-verifies every tentative match byte-by-byte, and finally walks J
//! emitting change commands in the selected format.

use std::io::Write;

use crate::{DiffArgs, DiffError, DiffFlags, DiffFormat, DiffResult};

const FUNCTION_CONTEXT_SIZE: usize = 55;
const BINARY_CHECK_LEN: usize = 1024;

/// Identity translation table.
const CLOW2LOW: [u8; 256] = {
    let mut t = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        t[i] = i as u8;
        i += 1;
    }
    t
};

/// Case-folding translation table: upper case maps to lower case.
const CUP2LOW: [u8; 256] = {
    let mut t = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        t[i] = if i >= b'A' as usize && i <= b'Z' as usize {
            i as u8 + 32
        } else {
            i as u8
        };
        i += 1;
    }
    t
};

#[derive(Clone, Copy, Default)]
struct Line {
    serial: i32,
    value: i32,
}

#[derive(Clone, Copy, Default)]
struct Cand {
    x: i32,
    y: i32,
    pred: i32,
}

#[derive(Clone, Copy)]
struct ChangeRec {
    a: i32,
    b: i32,
    c: i32,
    d: i32,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn getc(&mut self) -> Option<u8> {
        let b = self.data.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }
}

/// Count the bytes of the cursor's current line, including the newline
/// (or one phantom byte at EOF, so a missing final newline is visible
/// to the output stage).
fn skipline(cur: &mut Cursor<'_>) -> i64 {
    let mut count = 1i64;
    while let Some(b) = cur.getc() {
        if b == b'\n' {
            break;
        }
        count += 1;
    }
    count
}

fn is_space(b: Option<u8>) -> bool {
    matches!(
        b,
        Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(0x0b) | Some(0x0c)
    )
}

/// Integer square root, Newton's method.
fn isqrt(n: i32) -> i32 {
    if n == 0 {
        return 0;
    }
    let mut x = 1i32;
    loop {
        let y = x;
        x = n / x;
        x += y;
        x /= 2;
        if (x - y).abs() <= 1 {
            return x;
        }
    }
}

struct DiffState<'a> {
    f1: &'a [u8],
    f2: &'a [u8],
    chrtran: &'static [u8; 256],
    len: [usize; 2],
    file: [Vec<Line>; 2],
    pref: usize,
    suff: usize,
    slen: [usize; 2],
    sfile: [Vec<Line>; 2],
    clist: Vec<Cand>,
    j: Vec<i32>,
    ixold: Vec<i64>,
    ixnew: Vec<i64>,
    anychange: bool,
    context_vec: Vec<ChangeRec>,
    header_pending: bool,
    lastline: i32,
    lastmatchline: i32,
    lastbuf: Vec<u8>,
}

/// Diff two in-memory files, writing any output to `out`.
pub fn diffreg(
    file1: &[u8],
    file2: &[u8],
    flags: DiffFlags,
    args: &DiffArgs,
    out: &mut dyn Write,
) -> Result<DiffResult, DiffError> {
    let f1: &[u8] = if flags.empty_lhs { b"" } else { file1 };
    let f2: &[u8] = if flags.empty_rhs { b"" } else { file2 };

    if !files_differ(f1, f2, flags) {
        return Ok(DiffResult::Same);
    }
    if !flags.force_ascii && (!ascii_file(f1) || !ascii_file(f2)) {
        return Ok(DiffResult::Binary);
    }

    let chrtran: &'static [u8; 256] = if flags.ignore_case {
        &CUP2LOW
    } else {
        &CLOW2LOW
    };

    let mut ds = DiffState {
        f1,
        f2,
        chrtran,
        len: [0, 0],
        file: [Vec::new(), Vec::new()],
        pref: 0,
        suff: 0,
        slen: [0, 0],
        sfile: [Vec::new(), Vec::new()],
        clist: Vec::new(),
        j: Vec::new(),
        ixold: Vec::new(),
        ixnew: Vec::new(),
        anychange: false,
        context_vec: Vec::new(),
        header_pending: flags.print_header && args.command_line.is_some(),
        lastline: 0,
        lastmatchline: 0,
        lastbuf: Vec::new(),
    };

    ds.prepare(0, flags);
    ds.prepare(1, flags);
    ds.prune();

    sort_lines(&mut ds.sfile[0], ds.slen[0]);
    sort_lines(&mut ds.sfile[1], ds.slen[1]);

    let mut member = vec![0i32; ds.slen[1] + 2];
    {
        let [sfile0, sfile1] = &mut ds.sfile;
        equiv(sfile0, ds.slen[0], sfile1, ds.slen[1], &mut member);
    }

    let mut class = vec![0i32; ds.slen[0] + 2];
    unsort(&ds.sfile[0], ds.slen[0], &mut class);

    let mut klist = vec![0i32; ds.slen[0] + 2];
    let k = ds.stone(&class, ds.slen[0], &member, &mut klist, flags);

    ds.j = vec![0i32; ds.len[0] + 2];
    ds.unravel(klist[k as usize]);

    ds.ixold = vec![0i64; ds.len[0] + 2];
    ds.ixnew = vec![0i64; ds.len[1] + 2];
    ds.check(flags);

    ds.output(out, args, flags)?;

    Ok(if ds.anychange {
        DiffResult::Differ
    } else {
        DiffResult::Same
    })
}

fn files_differ(f1: &[u8], f2: &[u8], flags: DiffFlags) -> bool {
    if flags.empty_lhs || flags.empty_rhs {
        return true;
    }
    f1 != f2
}

fn ascii_file(data: &[u8]) -> bool {
    let probe = &data[..data.len().min(BINARY_CHECK_LEN)];
    !probe.contains(&0)
}

/// Hash one line into its equivalence value.
///
/// Sedgewick's multiplicative hash; a zero sum marks EOF, so an actual
/// zero is remapped to 1.
fn readhash(cur: &mut Cursor<'_>, flags: DiffFlags, chrtran: &[u8; 256]) -> i32 {
    let mut sum: i32 = 1;
    let mut chars = 0usize;
    let mut space = false;

    if !flags.fold_blanks && !flags.ignore_blanks {
        loop {
            match cur.getc() {
                None => {
                    if chars == 0 {
                        return 0;
                    }
                    break;
                }
                Some(b'\n') => break,
                Some(t) => {
                    let v = if flags.ignore_case {
                        chrtran[t as usize] as i32
                    } else {
                        t as i32
                    };
                    sum = sum.wrapping_mul(127).wrapping_add(v);
                    chars += 1;
                }
            }
        }
    } else {
        loop {
            match cur.getc() {
                Some(b'\t') | Some(b'\r') | Some(0x0b) | Some(0x0c) | Some(b' ') => {
                    space = true;
                }
                Some(b'\n') => break,
                None => {
                    if chars == 0 {
                        return 0;
                    }
                    break;
                }
                Some(t) => {
                    if space && !flags.ignore_blanks {
                        chars += 1;
                        space = false;
                    }
                    sum = sum
                        .wrapping_mul(127)
                        .wrapping_add(chrtran[t as usize] as i32);
                    chars += 1;
                }
            }
        }
    }

    if sum == 0 {
        1
    } else {
        sum
    }
}

fn sort_lines(lines: &mut [Line], n: usize) {
    if n == 0 {
        return;
    }
    lines[1..=n].sort_by(|a, b| a.value.cmp(&b.value).then(a.serial.cmp(&b.serial)));
}

/// Replace each line value of file 1 with the index of the first
/// element of its matching equivalence class in (sorted) file 2; the
/// classes of file 2 are concatenated into `c` with negative-flagged
/// first members.
fn equiv(a: &mut [Line], n: usize, b: &mut [Line], m: usize, c: &mut [i32]) {
    let mut i = 1usize;
    let mut j = 1usize;
    while i <= n && j <= m {
        if a[i].value < b[j].value {
            a[i].value = 0;
            i += 1;
        } else if a[i].value == b[j].value {
            a[i].value = j as i32;
            i += 1;
        } else {
            j += 1;
        }
    }
    while i <= n {
        a[i].value = 0;
        i += 1;
    }

    b[m + 1].value = 0;
    j = 0;
    loop {
        j += 1;
        if j > m {
            break;
        }
        c[j] = -b[j].serial;
        while b[j + 1].value == b[j].value {
            j += 1;
            c[j] = b[j].serial;
        }
    }
    c[j] = -1;
}

fn unsort(sorted: &[Line], l: usize, b: &mut [i32]) {
    let mut a = vec![0i32; l + 1];
    for item in sorted.iter().take(l + 1).skip(1) {
        a[item.serial as usize] = item.value;
    }
    for (i, slot) in b.iter_mut().enumerate().take(l + 1).skip(1) {
        *slot = a[i];
    }
}

impl<'a> DiffState<'a> {
    fn prepare(&mut self, which: usize, flags: DiffFlags) {
        let data = if which == 0 { self.f1 } else { self.f2 };
        let mut cursor = Cursor::new(data);
        let mut lines = vec![Line::default()]; // slot 0 unused
        loop {
            let h = readhash(&mut cursor, flags, self.chrtran);
            if h == 0 {
                break;
            }
            lines.push(Line { serial: 0, value: h });
        }
        self.len[which] = lines.len() - 1;
        self.file[which] = lines;
    }

    /// Strip the common prefix and suffix; the candidate pass only sees
    /// the middle.
    fn prune(&mut self) {
        self.pref = 0;
        while self.pref < self.len[0]
            && self.pref < self.len[1]
            && self.file[0][self.pref + 1].value == self.file[1][self.pref + 1].value
        {
            self.pref += 1;
        }
        self.suff = 0;
        while self.suff < self.len[0] - self.pref
            && self.suff < self.len[1] - self.pref
            && self.file[0][self.len[0] - self.suff].value
                == self.file[1][self.len[1] - self.suff].value
        {
            self.suff += 1;
        }

        for which in 0..2 {
            let slen = self.len[which] - self.pref - self.suff;
            self.slen[which] = slen;
            let mut sfile = Vec::with_capacity(slen + 2);
            for i in 0..=slen {
                let mut line = self.file[which][self.pref + i];
                line.serial = i as i32;
                sfile.push(line);
            }
            sfile.push(Line::default()); // sentinel slot slen+1
            self.sfile[which] = sfile;
        }
    }

    fn newcand(&mut self, x: i32, y: i32, pred: i32) -> i32 {
        self.clist.push(Cand { x, y, pred });
        (self.clist.len() - 1) as i32
    }

    fn search(&self, c: &[i32], k: i32, y: i32) -> i32 {
        if self.clist[c[k as usize] as usize].y < y {
            // quick look for the typical append case
            return k + 1;
        }
        let mut i = 0i32;
        let mut j = k + 1;
        loop {
            let l = (i + j) / 2;
            if l <= i {
                return l + 1;
            }
            let t = self.clist[c[l as usize] as usize].y;
            if t > y {
                j = l;
            } else if t < y {
                i = l;
            } else {
                return l;
            }
        }
    }

    /// The candidate pass. Returns the length k of the longest common
    /// subsequence found; `c` holds the k-candidate chain heads.
    fn stone(&mut self, a: &[i32], n: usize, b: &[i32], c: &mut [i32], flags: DiffFlags) -> i32 {
        let bound: u32 = if flags.minimal {
            u32::MAX
        } else {
            std::cmp::max(256, isqrt(n as i32)) as u32
        };

        let mut k = 0i32;
        c[0] = self.newcand(0, 0, 0);
        for i in 1..=n {
            let mut j = a[i] as usize;
            if j == 0 {
                continue;
            }
            let mut y = -b[j];
            let mut oldl = 0i32;
            let mut oldc = c[0];
            let mut numtries = 0u32;
            loop {
                if y > self.clist[oldc as usize].y {
                    let l = self.search(c, k, y);
                    if l != oldl + 1 {
                        oldc = c[(l - 1) as usize];
                    }
                    if l <= k {
                        if self.clist[c[l as usize] as usize].y > y {
                            let tc = c[l as usize];
                            c[l as usize] = self.newcand(i as i32, y, oldc);
                            oldc = tc;
                            oldl = l;
                            numtries += 1;
                        }
                    } else {
                        c[l as usize] = self.newcand(i as i32, y, oldc);
                        k += 1;
                        break;
                    }
                }
                j += 1;
                y = b[j];
                if y <= 0 || numtries >= bound {
                    break;
                }
            }
        }
        k
    }

    /// Pull the winning candidate chain out into the J vector.
    fn unravel(&mut self, p: i32) {
        let len0 = self.len[0] as i64;
        let len1 = self.len[1] as i64;
        for i in 0..=self.len[0] {
            let ii = i as i64;
            self.j[i] = if ii <= self.pref as i64 {
                ii as i32
            } else if ii > len0 - self.suff as i64 {
                (ii + len1 - len0) as i32
            } else {
                0
            };
        }
        let mut q = p;
        loop {
            let cand = self.clist[q as usize];
            if cand.y == 0 {
                break;
            }
            self.j[cand.x as usize + self.pref] = cand.y + self.pref as i32;
            q = cand.pred;
        }
    }

    /// Verify tentative matches byte-by-byte (breaking hash collisions)
    /// and record the byte offset of every line for the output stage.
    fn check(&mut self, flags: DiffFlags) {
        let mut c1 = Cursor::new(self.f1);
        let mut c2 = Cursor::new(self.f2);
        let mut j = 1usize;
        self.ixold[0] = 0;
        self.ixnew[0] = 0;
        let mut ctold = 0i64;
        let mut ctnew = 0i64;

        for i in 1..=self.len[0] {
            if self.j[i] == 0 {
                ctold += skipline(&mut c1);
                self.ixold[i] = ctold;
                continue;
            }
            while (j as i32) < self.j[i] {
                ctnew += skipline(&mut c2);
                self.ixnew[j] = ctnew;
                j += 1;
            }
            if flags.fold_blanks || flags.ignore_blanks || flags.ignore_case {
                loop {
                    let mut c = c1.getc();
                    let mut d = c2.getc();
                    // A missing newline on one side is not a change
                    // under -b or -w.
                    if flags.fold_blanks || flags.ignore_blanks {
                        if c.is_none() && d == Some(b'\n') {
                            ctnew += 1;
                            break;
                        }
                        if c == Some(b'\n') && d.is_none() {
                            ctold += 1;
                            break;
                        }
                    }
                    ctold += 1;
                    ctnew += 1;
                    if flags.fold_blanks && is_space(c) && is_space(d) {
                        loop {
                            if c == Some(b'\n') {
                                break;
                            }
                            ctold += 1;
                            c = c1.getc();
                            if !is_space(c) {
                                break;
                            }
                        }
                        loop {
                            if d == Some(b'\n') {
                                break;
                            }
                            ctnew += 1;
                            d = c2.getc();
                            if !is_space(d) {
                                break;
                            }
                        }
                    } else if flags.ignore_blanks {
                        while is_space(c) && c != Some(b'\n') {
                            c = c1.getc();
                            ctold += 1;
                        }
                        while is_space(d) && d != Some(b'\n') {
                            d = c2.getc();
                            ctnew += 1;
                        }
                    }
                    let tc = c.map(|b| self.chrtran[b as usize]);
                    let td = d.map(|b| self.chrtran[b as usize]);
                    if tc != td {
                        self.j[i] = 0;
                        if c != Some(b'\n') && c.is_some() {
                            ctold += skipline(&mut c1);
                        }
                        if d != Some(b'\n') && d.is_some() {
                            ctnew += skipline(&mut c2);
                        }
                        break;
                    }
                    if c == Some(b'\n') || c.is_none() {
                        break;
                    }
                }
            } else {
                loop {
                    ctold += 1;
                    ctnew += 1;
                    let c = c1.getc();
                    let d = c2.getc();
                    if c != d {
                        self.j[i] = 0;
                        if c != Some(b'\n') && c.is_some() {
                            ctold += skipline(&mut c1);
                        }
                        if d != Some(b'\n') && d.is_some() {
                            ctnew += skipline(&mut c2);
                        }
                        break;
                    }
                    if c == Some(b'\n') || c.is_none() {
                        break;
                    }
                }
            }
            self.ixold[i] = ctold;
            self.ixnew[j] = ctnew;
            j += 1;
        }
        while j <= self.len[1] {
            ctnew += skipline(&mut c2);
            self.ixnew[j] = ctnew;
            j += 1;
        }
    }

    /// Walk J and emit one change command per run of non-matching
    /// lines.
    fn output(
        &mut self,
        out: &mut dyn Write,
        args: &DiffArgs,
        flags: DiffFlags,
    ) -> Result<(), DiffError> {
        let m = self.len[0] as i32;
        self.j[0] = 0;
        self.j[m as usize + 1] = self.len[1] as i32 + 1;

        let mut i0 = 1i32;
        while i0 <= m {
            while i0 <= m && self.j[i0 as usize] == self.j[i0 as usize - 1] + 1 {
                i0 += 1;
            }
            let j0 = self.j[i0 as usize - 1] + 1;
            let mut i1 = i0 - 1;
            while i1 < m && self.j[i1 as usize + 1] == 0 {
                i1 += 1;
            }
            let j1 = self.j[i1 as usize + 1] - 1;
            self.j[i1 as usize] = j1;
            self.change(out, args, flags, i0, i1, j0, j1)?;
            i0 = i1 + 1;
        }
        if m == 0 {
            self.change(out, args, flags, 1, 0, 1, self.len[1] as i32)?;
        }
        if self.anychange && args.format == DiffFormat::Unified {
            self.dump_unified_vec(out, args, flags)?;
        }
        Ok(())
    }

    /// Record or print one change: lines a..=b of file 1 became lines
    /// c..=d of file 2.
    fn change(
        &mut self,
        out: &mut dyn Write,
        args: &DiffArgs,
        flags: DiffFlags,
        a: i32,
        b: i32,
        c: i32,
        d: i32,
    ) -> Result<(), DiffError> {
        if a > b && c > d {
            return Ok(());
        }
        if self.header_pending {
            if let Some(ref cmd) = args.command_line {
                writeln!(out, "{} {} {}", cmd, args.label_left, args.label_right)?;
            }
            self.header_pending = false;
        }

        if args.format == DiffFormat::Unified {
            if !self.anychange {
                writeln!(out, "--- {}", args.label_left)?;
                writeln!(out, "+++ {}", args.label_right)?;
                self.anychange = true;
            } else if let Some(&last) = self.context_vec.last() {
                let gap = 2 * args.context as i32 + 1;
                if a > last.b + gap && c > last.d + gap {
                    // Far enough from the previous change: flush the
                    // accumulated hunk.
                    self.dump_unified_vec(out, args, flags)?;
                }
            }
            self.context_vec.push(ChangeRec { a, b, c, d });
            return Ok(());
        }

        self.anychange = true;
        if args.format == DiffFormat::Brief {
            return Ok(());
        }

        // Normal format.
        range(out, a, b, ",")?;
        let letter = if a > b {
            'a'
        } else if c > d {
            'd'
        } else {
            'c'
        };
        write!(out, "{letter}")?;
        range(out, c, d, ",")?;
        writeln!(out)?;
        self.fetch(out, OLD, a, b, b'<', args, flags)?;
        if a <= b && c <= d {
            writeln!(out, "---")?;
        }
        self.fetch(out, NEW, c, d, b'>', args, flags)?;
        Ok(())
    }

    /// Flush the accumulated unified change records as one hunk.
    fn dump_unified_vec(
        &mut self,
        out: &mut dyn Write,
        args: &DiffArgs,
        flags: DiffFlags,
    ) -> Result<(), DiffError> {
        if self.context_vec.is_empty() {
            return Ok(());
        }
        let context = args.context as i32;
        let first = self.context_vec[0];
        let last = *self.context_vec.last().expect("non-empty");

        let mut lowa = std::cmp::max(1, first.a - context);
        let upb = std::cmp::min(self.len[0] as i32, last.b + context);
        let mut lowc = std::cmp::max(1, first.c - context);
        let upd = std::cmp::min(self.len[1] as i32, last.d + context);

        write!(out, "@@ -")?;
        uni_range(out, lowa, upb)?;
        write!(out, " +")?;
        uni_range(out, lowc, upd)?;
        write!(out, " @@")?;
        if flags.prototype {
            if let Some(proto) = self.match_function(lowa - 1) {
                write!(out, " {proto}")?;
            }
        }
        writeln!(out)?;

        let records = std::mem::take(&mut self.context_vec);
        let mut d_end = 0i32;
        for cv in &records {
            let (a, b, c, d) = (cv.a, cv.b, cv.c, cv.d);
            if a <= b && c <= d {
                self.fetch(out, OLD, lowa, a - 1, b' ', args, flags)?;
                self.fetch(out, OLD, a, b, b'-', args, flags)?;
                self.fetch(out, NEW, c, d, b'+', args, flags)?;
            } else if a <= b {
                self.fetch(out, OLD, lowa, a - 1, b' ', args, flags)?;
                self.fetch(out, OLD, a, b, b'-', args, flags)?;
            } else {
                self.fetch(out, NEW, lowc, c - 1, b' ', args, flags)?;
                self.fetch(out, NEW, c, d, b'+', args, flags)?;
            }
            lowa = b + 1;
            lowc = d + 1;
            d_end = d;
        }
        self.fetch(out, NEW, d_end + 1, upd, b' ', args, flags)?;
        Ok(())
    }

    /// Write lines a..=b of one side, each prefixed with `ch`.
    fn fetch(
        &self,
        out: &mut dyn Write,
        which: usize,
        a: i32,
        b: i32,
        ch: u8,
        args: &DiffArgs,
        flags: DiffFlags,
    ) -> Result<(), DiffError> {
        if a > b {
            return Ok(());
        }
        let (ix, data) = if which == OLD {
            (&self.ixold, self.f1)
        } else {
            (&self.ixnew, self.f2)
        };
        for i in a..=b {
            let start = ix[i as usize - 1] as usize;
            let nc = (ix[i as usize] - ix[i as usize - 1]) as usize;
            if ch != 0 {
                out.write_all(&[ch])?;
                if args.format != DiffFormat::Unified {
                    out.write_all(b" ")?;
                }
            }
            let mut col = 0usize;
            for k in 0..nc {
                let idx = start + k;
                if idx >= data.len() {
                    writeln!(out, "\n\\ No newline at end of file")?;
                    return Ok(());
                }
                let byte = data[idx];
                if byte == b'\t' && flags.expand_tabs {
                    loop {
                        out.write_all(b" ")?;
                        col += 1;
                        if col % 8 == 0 {
                            break;
                        }
                    }
                } else {
                    out.write_all(&[byte])?;
                    col += 1;
                }
            }
        }
        Ok(())
    }

    /// Search backwards from `pos` for a line that looks like a
    /// function heading, remembering access-modifier labels along the
    /// way.
    fn match_function(&mut self, pos: i32) -> Option<String> {
        let last = self.lastline;
        self.lastline = pos;
        let mut state: Option<&'static str> = None;
        let mut pos = pos;

        while pos > last {
            let start = self.ixold[pos as usize - 1] as usize;
            let mut nc = (self.ixold[pos as usize] - self.ixold[pos as usize - 1]) as usize;
            if nc >= FUNCTION_CONTEXT_SIZE {
                nc = FUNCTION_CONTEXT_SIZE - 1;
            }
            let end = (start + nc).min(self.f1.len());
            if end > start {
                let mut buf = self.f1[start..end].to_vec();
                if let Some(nl) = buf.iter().position(|&b| b == b'\n') {
                    buf.truncate(nl);
                }
                if !buf.is_empty()
                    && (buf[0].is_ascii_alphabetic() || buf[0] == b'_' || buf[0] == b'$')
                {
                    if buf.starts_with(b"private:") {
                        state.get_or_insert(" (private)");
                    } else if buf.starts_with(b"protected:") {
                        state.get_or_insert(" (protected)");
                    } else if buf.starts_with(b"public:") {
                        state.get_or_insert(" (public)");
                    } else {
                        buf.truncate(FUNCTION_CONTEXT_SIZE - 1);
                        if let Some(s) = state {
                            buf.extend_from_slice(s.as_bytes());
                        }
                        self.lastbuf = buf;
                        self.lastmatchline = pos;
                        return Some(String::from_utf8_lossy(&self.lastbuf).into_owned());
                    }
                }
            }
            pos -= 1;
        }

        if self.lastmatchline > 0 {
            Some(String::from_utf8_lossy(&self.lastbuf).into_owned())
        } else {
            None
        }
    }
}

const OLD: usize = 0;
const NEW: usize = 1;

fn range(out: &mut dyn Write, a: i32, b: i32, separator: &str) -> Result<(), DiffError> {
    write!(out, "{}", if a > b { b } else { a })?;
    if a < b {
        write!(out, "{separator}{b}")?;
    }
    Ok(())
}

fn uni_range(out: &mut dyn Write, a: i32, b: i32) -> Result<(), DiffError> {
    if a < b {
        write!(out, "{},{}", a, b - a + 1)?;
    } else if a == b {
        write!(out, "{b}")?;
    } else {
        write!(out, "{b},0")?;
    }
    Ok(())
}
