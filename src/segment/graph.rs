// s-t flow network for the graph cut: pixels are nodes, neighbour links are
// undirected arcs, terminal links carry the color-model costs.
// Max-flow is Dinic's algorithm with an explicit stack (no recursion, so
// large photos cannot blow the call stack).

const NONE: u32 = u32::MAX;
const EPS: f64 = 1e-9;

pub(crate) struct FlowGraph {
    nodes: usize, // pixel nodes; source and sink follow them
    head: Vec<u32>,
    next: Vec<u32>,
    to: Vec<u32>,
    cap: Vec<f64>, // residual capacity; arc e and e^1 are a pair
}

impl FlowGraph {
    pub fn with_capacity(nodes: usize, arcs: usize) -> Self {
        Self {
            nodes,
            head: vec![NONE; nodes + 2],
            next: Vec::with_capacity(arcs * 2),
            to: Vec::with_capacity(arcs * 2),
            cap: Vec::with_capacity(arcs * 2),
        }
    }

    #[inline]
    fn source(&self) -> usize {
        self.nodes
    }

    #[inline]
    fn sink(&self) -> usize {
        self.nodes + 1
    }

    fn push_arc(&mut self, from: usize, to: usize, cap: f64) {
        let e = self.to.len() as u32;
        self.to.push(to as u32);
        self.cap.push(cap);
        self.next.push(self.head[from]);
        self.head[from] = e;
    }

    /// Arc pair `a -> b` with capacity `cap` and `b -> a` with `rev_cap`.
    pub fn add_edge(&mut self, a: usize, b: usize, cap: f64, rev_cap: f64) {
        self.push_arc(a, b, cap);
        self.push_arc(b, a, rev_cap);
    }

    /// Terminal links of a pixel. Only the difference between the two costs
    /// matters for the cut, so the shared part is dropped up front (this also
    /// makes negative costs legal).
    pub fn add_terminal_weights(&mut self, node: usize, from_source: f64, to_sink: f64) {
        let base = from_source.min(to_sink);
        let (s_cap, t_cap) = (from_source - base, to_sink - base);
        if s_cap > 0.0 {
            let s = self.source();
            self.add_edge(s, node, s_cap, 0.0);
        }
        if t_cap > 0.0 {
            let t = self.sink();
            self.add_edge(node, t, t_cap, 0.0);
        }
    }

    /// Build a level graph from the source; true when the sink is reachable.
    fn bfs_levels(&self, level: &mut [i32], queue: &mut Vec<u32>) -> bool {
        level.fill(-1);
        queue.clear();
        let s = self.source();
        level[s] = 0;
        queue.push(s as u32);
        let mut qi = 0;
        while qi < queue.len() {
            let u = queue[qi] as usize;
            qi += 1;
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e as usize] as usize;
                if level[v] < 0 && self.cap[e as usize] > EPS {
                    level[v] = level[u] + 1;
                    queue.push(v as u32);
                }
                e = self.next[e as usize];
            }
        }
        level[self.sink()] >= 0
    }

    /// Push a blocking flow along the current level graph.
    fn blocking_flow(&mut self, level: &mut [i32], iter: &mut [u32]) -> f64 {
        let (s, t) = (self.source(), self.sink());
        let mut pushed = 0.0;
        let mut path: Vec<u32> = Vec::new();
        let mut u = s;

        loop {
            if u == t {
                // 1) bottleneck along the path
                let mut f = f64::INFINITY;
                for &e in &path {
                    f = f.min(self.cap[e as usize]);
                }
                // 2) augment and find the first saturated arc
                let mut cut_at = path.len();
                for (i, &e) in path.iter().enumerate() {
                    self.cap[e as usize] -= f;
                    self.cap[(e ^ 1) as usize] += f;
                    if cut_at == path.len() && self.cap[e as usize] <= EPS {
                        cut_at = i;
                    }
                }
                pushed += f;
                // 3) resume from the tail of the first saturated arc
                let e = path[cut_at];
                u = self.to[(e ^ 1) as usize] as usize;
                path.truncate(cut_at);
                continue;
            }

            // advance along an admissible arc
            let mut e = iter[u];
            while e != NONE {
                let v = self.to[e as usize] as usize;
                if self.cap[e as usize] > EPS && level[v] == level[u] + 1 {
                    break;
                }
                e = self.next[e as usize];
            }
            iter[u] = e;

            if e != NONE {
                path.push(e);
                u = self.to[e as usize] as usize;
                continue;
            }

            // retreat: u is a dead end in this phase
            if u == s {
                break;
            }
            level[u] = -1;
            let back = path.pop().unwrap_or(NONE);
            if back == NONE {
                break;
            }
            u = self.to[(back ^ 1) as usize] as usize;
            iter[u] = self.next[iter[u] as usize];
        }
        pushed
    }

    /// Run max-flow; returns the flow value.
    pub fn max_flow(&mut self) -> f64 {
        let n = self.nodes + 2;
        let mut level = vec![-1i32; n];
        let mut iter = vec![NONE; n];
        let mut queue = Vec::with_capacity(n);
        let mut flow = 0.0;
        while self.bfs_levels(&mut level, &mut queue) {
            iter.copy_from_slice(&self.head);
            let f = self.blocking_flow(&mut level, &mut iter);
            if f <= 0.0 {
                break;
            }
            flow += f;
        }
        flow
    }

    /// After `max_flow`: which pixel nodes stay connected to the source in
    /// the residual graph (the foreground side of the min cut).
    pub fn source_side(&self) -> Vec<bool> {
        let n = self.nodes + 2;
        let mut seen = vec![false; n];
        let mut stack = vec![self.source()];
        seen[self.source()] = true;
        while let Some(u) = stack.pop() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e as usize] as usize;
                if !seen[v] && self.cap[e as usize] > EPS {
                    seen[v] = true;
                    stack.push(v);
                }
                e = self.next[e as usize];
            }
        }
        seen.truncate(self.nodes);
        seen
    }
}
